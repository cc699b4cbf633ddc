//! Crate-wide error types.
//!
//! All functions return `Result<T, PipelineError>` instead of using
//! `unwrap()`. Component boundaries (adapters, the LLM client, the
//! full-text fetcher) degrade to empty/default values rather than letting
//! errors cross into the orchestrator; `PipelineError` exists for the
//! inner layers of those components and for the CLI/server surface.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML/XML/response parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from API
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error (e.g. a backend-specific query fails syntax checks)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The structured LLM capability failed or returned unusable output
    #[error("LLM error: {0}")]
    Llm(String),

    /// The enclosing request scope was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using `PipelineError`
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PipelineError::Parse(msg.to_string()))
    }
}
