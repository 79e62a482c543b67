//! Runtime snapshots.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use flowgrid_core::RuntimeStatus;
use flowgrid_pool::PoolSnapshot;

/// Point-in-time view of the runtime and every pool, in `run()` order.
///
/// Serializes as `{"status": "RUNNING", "timestamp_millis": .., "processors": [..]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub status: RuntimeStatus,
    pub timestamp_millis: u64,
    pub processors: Vec<PoolSnapshot>,
}

impl RuntimeSnapshot {
    /// Wrap pool snapshots with a freshly captured timestamp.
    pub fn new(status: RuntimeStatus, processors: Vec<PoolSnapshot>) -> Self {
        Self {
            status,
            timestamp_millis: epoch_millis(),
            processors,
        }
    }
}

/// Current Unix epoch in milliseconds.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
