//! Workspace-wide error type for the Shannon core.
//!
//! Mirrors the semantic error kinds called out by the spec so callers can
//! match on *meaning* (rate limited, permission denied, ...) without
//! depending on the concrete source (SQLite, reqwest, serde_json, ...).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShannonError {
    #[error("rate limited")]
    RateLimited,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("validation failure: {0}")]
    ValidationFailure(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ShannonError>;

impl From<rusqlite::Error> for ShannonError {
    fn from(e: rusqlite::Error) -> Self {
        ShannonError::PersistenceError(e.to_string())
    }
}

impl From<serde_json::Error> for ShannonError {
    fn from(e: serde_json::Error) -> Self {
        ShannonError::InvalidInput(e.to_string())
    }
}

impl From<reqwest::Error> for ShannonError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ShannonError::Timeout
        } else {
            ShannonError::ProviderError(e.to_string())
        }
    }
}

impl From<std::io::Error> for ShannonError {
    fn from(e: std::io::Error) -> Self {
        ShannonError::Internal(e.to_string())
    }
}
