//! Crate-wide error types

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the session engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed transcript or turn shape; fails fast to the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream completion endpoint failure, categorized
    #[error(transparent)]
    Upstream(#[from] crate::upstream::UpstreamError),

    /// Transcript store read/write failure; logged and swallowed by the
    /// turn-processing path, fatal only on explicit reload
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation on an unknown or already-ended session
    #[error("Session state error: {0}")]
    State(String),

    /// Admission gate rejected the request
    #[error("Rate limit exceeded for user {0}")]
    RateLimited(String),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// True when retrying later could succeed (caller's decision; the
    /// engine itself never retries)
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Upstream(e) => e.is_transient(),
            EngineError::RateLimited(_) => true,
            _ => false,
        }
    }
}
