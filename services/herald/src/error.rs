//! Error types for the herald service

use std::path::PathBuf;

/// Errors that can occur in the herald service
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notifier method '{0}' is already registered")]
    DuplicateMethod(String),

    #[error("Extension '{}' could not load correctly: {reason}", artifact.display())]
    LoadFailure { artifact: PathBuf, reason: String },

    #[error("Extension process error: {0}")]
    Extension(String),

    #[error("Send failed: {0}")]
    SendFailure(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Extension catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("No notifier registered for method '{0}'")]
    NotFound(String),
}

impl HeraldError {
    /// Whether this error came from an exceeded deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, HeraldError::Timeout(_))
    }
}

/// Result type alias for herald operations
pub type Result<T> = std::result::Result<T, HeraldError>;
