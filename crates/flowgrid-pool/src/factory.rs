//! Pool construction.

use flowgrid_core::{ProcessorGroup, ProcessorOptions, RunId};

use crate::error::PoolResult;
use crate::handle::SharedPoolHandle;

/// Builds pool handles, one constructor per implemented group type.
///
/// The orchestrator picks the constructor from `group.group_type`, so an
/// implementation never sees a group of the wrong type. Constructors must
/// not block: they are called from the orchestrator's own task.
pub trait PoolFactory: Send + Sync {
    fn consumer_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle>;

    fn collector_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle>;

    fn endpoint_pool(
        &self,
        run_id: &RunId,
        group: &ProcessorGroup,
        options: &ProcessorOptions,
    ) -> PoolResult<SharedPoolHandle>;
}
