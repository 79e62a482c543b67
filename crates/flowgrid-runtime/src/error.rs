//! Runtime error types.

use thiserror::Error;

use flowgrid_core::{ConfigError, ProcessorType, RuntimeStatus};
use flowgrid_pool::PoolError;

/// Errors surfaced by the runtime orchestrator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime must be IDLE to run, current status is {0}")]
    IllegalState(RuntimeStatus),

    #[error("processor group type {0} is not supported")]
    UnsupportedGroupType(ProcessorType),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// The runtime was force-stopped and no longer serves requests.
    #[error("runtime terminated")]
    Terminated,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
