//! Process-wide configuration: API keys/base URLs loaded from the
//! environment (via `.env` through `dotenvy`, same loading order the
//! teacher relied on for `llm_base_url`/`llm_key`/EasyScholar keys), plus an
//! optional TOML file for the concurrency/retry/backend knobs that rarely
//! change between runs.

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Per-backend network tuning. `max_retries`/`base_backoff_ms`/`max_backoff_ms`
/// default to the values every backend shares unless overridden; `concurrency`
/// is backend-specific (see the `default_*` functions below) since each
/// scholarly API tolerates a different number of simultaneous requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendLimits {
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_retries: 5,
            base_backoff_ms: 2_000,
            max_backoff_ms: 45_000,
        }
    }
}

impl BackendLimits {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_openalex() -> BackendLimits {
    BackendLimits { concurrency: 2, ..BackendLimits::default() }
}
fn default_scopus() -> BackendLimits {
    BackendLimits { concurrency: 3, ..BackendLimits::default() }
}
fn default_core() -> BackendLimits {
    BackendLimits { concurrency: 2, ..BackendLimits::default() }
}
fn default_arxiv() -> BackendLimits {
    BackendLimits { concurrency: 1, ..BackendLimits::default() }
}
fn default_semantic_scholar() -> BackendLimits {
    BackendLimits { concurrency: 1, ..BackendLimits::default() }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    #[serde(default = "default_openalex")]
    pub openalex: BackendLimits,
    #[serde(default = "default_scopus")]
    pub scopus: BackendLimits,
    #[serde(default = "default_core")]
    pub core: BackendLimits,
    #[serde(default = "default_arxiv")]
    pub arxiv: BackendLimits,
    #[serde(default = "default_semantic_scholar")]
    pub semantic_scholar: BackendLimits,
    pub crossref: BackendLimits,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            openalex: default_openalex(),
            scopus: default_scopus(),
            core: default_core(),
            arxiv: default_arxiv(),
            semantic_scholar: default_semantic_scholar(),
            crossref: BackendLimits::default(),
        }
    }
}

/// TOML-file-backed knobs, distinct from the secret-bearing env vars below.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub backends: BackendsConfig,
    pub adjudication_concurrency: Option<usize>,
    pub ranking_group_concurrency: Option<usize>,
}

/// Everything the pipeline needs to run, assembled once at process start.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub semantic_scholar_api_key: Option<String>,
    pub scopus_api_key: Option<String>,
    pub core_api_key: Option<String>,
    pub backends: BackendsConfig,
    pub adjudication_concurrency: usize,
    pub ranking_group_concurrency: usize,
}

impl PipelineConfig {
    /// Load `.env` (if present), then environment variables, then overlay an
    /// optional TOML file for the non-secret knobs. Mirrors
    /// `main.rs`'s pattern of an `Option<String>` CLI/env value with a
    /// hard-coded fallback, generalized to a `Config(...)` error instead of
    /// a silent default when something required is missing.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let llm_base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let llm_api_key = std::env::var("LLM_API_KEY").map_err(|_| {
            PipelineError::Config("LLM_API_KEY must be set (directly or via .env)".to_string())
        })?;
        let llm_model = std::env::var("DEFAULT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let file_config = match toml_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)
                    .map_err(|e| PipelineError::Config(format!("invalid config file: {}", e)))?
            }
            _ => FileConfig::default(),
        };

        Ok(Self {
            llm_base_url,
            llm_api_key,
            llm_model,
            semantic_scholar_api_key: std::env::var("SEMANTIC_SCHOLAR_KEY").ok(),
            scopus_api_key: std::env::var("SCOPUS_API_KEY").ok(),
            core_api_key: std::env::var("CORE_API_KEY").ok(),
            backends: file_config.backends,
            adjudication_concurrency: file_config.adjudication_concurrency.unwrap_or(6),
            ranking_group_concurrency: file_config.ranking_group_concurrency.unwrap_or(4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_limits_default_matches_documented_values() {
        let limits = BackendLimits::default();
        assert_eq!(limits.max_retries, 5);
        assert_eq!(limits.base_backoff_ms, 2_000);
        assert_eq!(limits.max_backoff_ms, 45_000);
    }

    #[test]
    fn per_backend_concurrency_defaults_match_documented_values() {
        let backends = BackendsConfig::default();
        assert_eq!(backends.openalex.concurrency, 2);
        assert_eq!(backends.scopus.concurrency, 3);
        assert_eq!(backends.core.concurrency, 2);
        assert_eq!(backends.arxiv.concurrency, 1);
        assert_eq!(backends.semantic_scholar.concurrency, 1);
        assert_eq!(backends.arxiv.max_retries, 5);
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let toml_str = r#"
            adjudication_concurrency = 10

            [backends.arxiv]
            concurrency = 7
        "#;
        let parsed: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.adjudication_concurrency, Some(10));
        assert_eq!(parsed.backends.arxiv.concurrency, 7);
        assert_eq!(parsed.backends.openalex.concurrency, 2);
    }
}
