//! Error surface of the similarity pipeline.
//!
//! Only the variants here cross the API boundary. Per-source fetch failures,
//! cache backend outages, and debounced-save failures are recovered locally
//! and never become a `CoreError`.

use thiserror::Error;

/// Errors surfaced to callers of the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request: bad shape, out-of-range threshold, bad language code.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The batch could not complete within its global deadline. Partial
    /// results may still have been returned alongside this flag.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The embedding model or the index is unusable; the request cannot proceed.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Operation not supported by the active index strategy.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Request-level rate limit hit (per-source limits inside the federator
    /// are silent and do not produce this).
    #[error("rate limited")]
    RateLimited,

    /// Persistence failure while saving or loading index state.
    #[error("persistence error: {0}")]
    Persist(#[from] std::io::Error),
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable tag used for metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::DeadlineExceeded => "deadline_exceeded",
            CoreError::Unavailable(_) => "unavailable",
            CoreError::UnsupportedOperation(_) => "unsupported_operation",
            CoreError::RateLimited => "rate_limited",
            CoreError::Persist(_) => "persist",
        }
    }
}
