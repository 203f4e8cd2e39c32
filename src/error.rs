//! Error types for codeloop
//!
//! Centralized error handling using thiserror.
//!
//! Timeouts and missing test reports are deliberately NOT variants here:
//! they are degraded `ExecutionResult`s, because a run that times out is a
//! failed iteration that feeds the refinement loop, not an abort.

use thiserror::Error;

/// All error types that can occur in codeloop
#[derive(Debug, Error)]
pub enum CodeloopError {
    /// Generated source failed to parse (model produced garbage)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generated source contains a blacklisted construct (never retried)
    #[error("Safety violation: {0}")]
    Safety(String),

    /// Model call failed or returned an empty response
    #[error("Generation error: {0}")]
    Generation(String),

    /// Prompt template rendering or loading failed
    #[error("Template error: {0}")]
    Template(String),

    /// Audit store / persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metaprompt cache could not be loaded or refreshed
    #[error("Metaprompt error: {0}")]
    Metaprompt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodeloopError {
    /// Whether this error aborts the whole refinement run immediately.
    ///
    /// Safety violations are fatal: a model producing dangerous code is a
    /// different failure class than a model producing incorrect code, so
    /// the coordinator never retries them with feedback.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodeloopError::Safety(_))
    }
}

/// Result type alias for codeloop operations
pub type Result<T> = std::result::Result<T, CodeloopError>;
