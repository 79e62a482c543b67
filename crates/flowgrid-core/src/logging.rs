//! Log filter construction from runtime options.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Build a filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Install a global fmt subscriber. Returns `false` if one is already set.
pub fn init(level: LogLevel) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .try_init()
        .is_ok()
}
