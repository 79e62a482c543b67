//! flowgrid-core: shared types for the flowgrid control plane.
//!
//! Everything here is plain data: the identifiers, processor group specs,
//! and option structs that the orchestrator (`flowgrid-runtime`) and the
//! pool collaborators (`flowgrid-pool`) exchange. Options are loaded from
//! TOML via [`RuntimeOptions::from_file`].

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{AutoscalerOptions, LogLevel, MAX_INTERVAL_SECS, ProcessorOptions, RuntimeOptions};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
