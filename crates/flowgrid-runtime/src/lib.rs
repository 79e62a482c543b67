//! flowgrid-runtime: the runtime orchestrator.
//!
//! Starts one worker pool per processor group, keeps them alive, asks them
//! to rescale on a schedule, and shuts them down. The orchestrator moves
//! through three states:
//!
//! ```text
//!            run()                 drain()
//!   IDLE ─────────────► RUNNING ─────────────► DRAINING
//!    ▲                                            │
//!    └──── every pool drained / reports IDLE ─────┘
//!
//!   drain() while DRAINING: terminate every pool, stop the runtime
//! ```
//!
//! # Architecture
//!
//! ```text
//! Runtime (Clone)
//!   └── mpsc ──► Supervisor task (owns all state)
//!                  ├── PoolReference per group, in run() order
//!                  │     ├── SharedPoolHandle (replaced on restart)
//!                  │     └── AutoscaleTimer
//!                  ├── supervision loop (probe, restart, autoscale)
//!                  └── JoinSet of child tasks (drain, probes, snapshots)
//! ```
//!
//! Pools come from a [`PoolFactory`](flowgrid_pool::PoolFactory); the
//! orchestrator only ever talks to them through
//! [`PoolHandle`](flowgrid_pool::PoolHandle).

pub mod error;
mod reference;
pub mod runtime;
pub mod snapshot;
mod supervisor;

#[cfg(test)]
mod testing;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::Runtime;
pub use snapshot::RuntimeSnapshot;
