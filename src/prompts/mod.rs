//! Prompt module for LLM-based operations.
//!
//! This module provides modular prompt templates for every LLM-driven stage
//! of the pipeline: per-backend query formulation, schema-driven paper
//! adjudication, group ranking, and top-N deep analysis.

pub mod analysis;
pub mod exclusion_extraction;
pub mod query_formulation;
pub mod ranking;
