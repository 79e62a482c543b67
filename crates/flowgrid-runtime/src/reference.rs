//! Pool references: the runtime's record of each started group.

use std::time::Duration;

use tokio::time::Instant;

use flowgrid_core::{ProcessorGroup, ProcessorType, RunId, RuntimeOptions};
use flowgrid_pool::{PoolFactory, SharedPoolHandle};

use crate::error::{RuntimeError, RuntimeResult};

/// A started pool plus the group needed to start it again.
///
/// Only `handle` is ever replaced; `processor_group` and the autoscale
/// timer survive restarts.
pub(crate) struct PoolReference {
    pub(crate) handle: SharedPoolHandle,
    pub(crate) processor_group: ProcessorGroup,
    pub(crate) autoscale: AutoscaleTimer,
}

/// Build a pool handle for a group, dispatching on its type.
///
/// Does not issue `run`; the caller owns that.
pub(crate) fn build_pool(
    factory: &dyn PoolFactory,
    run_id: &RunId,
    options: &RuntimeOptions,
    group: &ProcessorGroup,
) -> RuntimeResult<SharedPoolHandle> {
    let processor_options = options.processor_options(&group.group_id)?;
    let handle = match group.group_type {
        ProcessorType::Consumer => factory.consumer_pool(run_id, group, processor_options)?,
        ProcessorType::Collector => factory.collector_pool(run_id, group, processor_options)?,
        ProcessorType::Endpoint => factory.endpoint_pool(run_id, group, processor_options)?,
        ProcessorType::Connection => {
            return Err(RuntimeError::UnsupportedGroupType(group.group_type));
        }
    };
    Ok(handle)
}

/// Check a group can be started without building anything.
pub(crate) fn check_startable(options: &RuntimeOptions, group: &ProcessorGroup) -> RuntimeResult<()> {
    if group.group_type == ProcessorType::Connection {
        return Err(RuntimeError::UnsupportedGroupType(group.group_type));
    }
    options.processor_options(&group.group_id)?;
    Ok(())
}

/// Minimum-interval gate for one pool's scale attempts.
#[derive(Debug, Clone)]
pub(crate) struct AutoscaleTimer {
    interval: Duration,
    last_attempt: Instant,
}

impl AutoscaleTimer {
    /// Start the timer as if an attempt just happened at `now`.
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_attempt: now,
        }
    }

    /// Whether an attempt is due at `now`. A due timer restarts from `now`,
    /// so however many intervals elapsed, one call yields one attempt.
    pub(crate) fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_attempt) >= self.interval {
            self.last_attempt = now;
            true
        } else {
            false
        }
    }
}
