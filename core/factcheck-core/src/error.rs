//! Error types for factcheck-core operations.

use std::path::PathBuf;

/// All errors that can occur in factcheck-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // State Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("State unavailable: {0}")]
    StateUnavailable(String),
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
