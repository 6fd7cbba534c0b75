//! Error taxonomy (spec.md §7): failure modes, not mechanisms.
//!
//! Workers return these upward; a job decides per-variant whether to skip
//! the current item or terminate (see engine::hash and engine::compare).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    #[error("rate limited, retry after backoff")]
    RateLimited,

    #[error("transient provider error: {0}")]
    TransientProvider(String),

    #[error("permanent provider error: {0}")]
    PermanentProvider(String),

    #[error("not hashable: {0}")]
    NotHashable(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Internal(format!("sqlite: {e}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("json: {e}"))
    }
}

impl CoreError {
    /// True when a caller may retry the same operation after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::RateLimited | CoreError::TransientProvider(_))
    }

    /// True when the owning job should terminate rather than skip the item.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoreError::PermanentProvider(_) | CoreError::Internal(_) | CoreError::Integrity(_)
        )
    }
}
