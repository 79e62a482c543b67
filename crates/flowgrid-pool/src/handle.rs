//! The pool handle contract and the types it carries.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use flowgrid_core::{ProcessorType, RuntimeStatus};

use crate::error::{PoolError, PoolResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An addressable, independently-failing worker pool.
///
/// Every call returns a `Result`; [`PoolError::Unavailable`] means the pool
/// is gone and should be restarted by whoever supervises it.
pub trait PoolHandle: Send + Sync {
    /// Start processing. Callers do not wait on this.
    fn run(&self) -> BoxFuture<'_, PoolResult<()>>;

    /// Stop accepting work and shut down cooperatively.
    fn drain(&self) -> BoxFuture<'_, PoolResult<bool>>;

    fn status(&self) -> BoxFuture<'_, PoolResult<RuntimeStatus>>;

    /// Re-evaluate the pool's size. The decision belongs to the pool.
    fn scale(&self) -> BoxFuture<'_, PoolResult<()>>;

    fn snapshot(&self) -> BoxFuture<'_, PoolResult<PoolSnapshot>>;

    /// Stop immediately, skipping any graceful shutdown.
    fn terminate(&self) -> BoxFuture<'_, PoolResult<()>>;
}

pub type SharedPoolHandle = Arc<dyn PoolHandle>;

/// Point-in-time view of one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub group_id: String,
    pub group_type: ProcessorType,
    pub status: RuntimeStatus,
    pub num_replicas: u32,
    pub timestamp_millis: u64,
    /// Pool-specific counters and gauges.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Outcome of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The pool answered with its status.
    Alive(RuntimeStatus),
    /// The pool could not be reached.
    Unreachable(String),
    /// The pool answered with an error.
    Errored(String),
}

impl Probe {
    /// Probe a pool by asking for its status.
    pub async fn of(handle: &dyn PoolHandle) -> Probe {
        Probe::from(handle.status().await)
    }
}

impl From<PoolResult<RuntimeStatus>> for Probe {
    fn from(result: PoolResult<RuntimeStatus>) -> Self {
        match result {
            Ok(status) => Probe::Alive(status),
            Err(PoolError::Unavailable(reason)) => Probe::Unreachable(reason),
            Err(PoolError::Failed(reason)) => Probe::Errored(reason),
        }
    }
}
