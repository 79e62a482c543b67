//! Pool error types.

use thiserror::Error;

/// Errors returned by pool handle calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool cannot be reached: its task died, it was terminated, or
    /// its transport is gone. The orchestrator treats this as a crash.
    #[error("pool unavailable: {0}")]
    Unavailable(String),

    /// The pool answered but the operation failed.
    #[error("pool operation failed: {0}")]
    Failed(String),
}

impl PoolError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PoolError::Unavailable(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
