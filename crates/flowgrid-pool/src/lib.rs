//! flowgrid-pool: the worker pool contract.
//!
//! A worker pool runs one processor group. The orchestrator never looks
//! inside a pool; it only sends the messages of [`PoolHandle`] and reads
//! back results:
//!
//! ```text
//! PoolHandle
//!   ├── run()       fire-and-forget start
//!   ├── drain()     graceful shutdown, resolves with an ack
//!   ├── status()    IDLE | RUNNING | DRAINING
//!   ├── scale()     pool-local scale decision
//!   ├── snapshot()  PoolSnapshot
//!   └── terminate() forced stop, no draining
//! ```
//!
//! Handles are built by a [`PoolFactory`], one constructor per supported
//! group type. [`LocalPool`] is an in-process implementation backed by a
//! tokio task; it keeps replica bookkeeping only and does no item
//! processing.

pub mod error;
pub mod factory;
pub mod handle;
pub mod local;

pub use error::{PoolError, PoolResult};
pub use factory::PoolFactory;
pub use handle::{BoxFuture, PoolHandle, PoolSnapshot, Probe, SharedPoolHandle};
pub use local::{LocalPool, LocalPoolFactory, ReplicaEstimator};
