//! Runtime options and their TOML form.
//!
//! ```toml
//! checkin_frequency_loop_secs = 5
//! log_level = "info"
//!
//! [processor_options.ingest]
//! num_replicas = 2
//!
//! [processor_options.ingest.autoscaler_options]
//! min_replicas = 1
//! max_replicas = 8
//! autoscale_frequency_secs = 30
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Global options for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Per-group options, keyed by `group_id`.
    #[serde(default)]
    pub processor_options: HashMap<String, ProcessorOptions>,
    /// Supervision loop tick period.
    #[serde(default = "default_checkin_frequency_loop_secs")]
    pub checkin_frequency_loop_secs: f64,
    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorOptions {
    /// Replicas the pool starts with.
    #[serde(default = "default_num_replicas")]
    pub num_replicas: u32,
    #[serde(default = "default_num_cpus")]
    pub num_cpus: f64,
    #[serde(default = "default_num_concurrency")]
    pub num_concurrency: u32,
    #[serde(default)]
    pub autoscaler_options: AutoscalerOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalerOptions {
    #[serde(default = "default_true")]
    pub enable_autoscaler: bool,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
    /// Minimum interval between two scale attempts for the group.
    #[serde(default = "default_autoscale_frequency_secs")]
    pub autoscale_frequency_secs: f64,
}

/// Log verbosity. Accepts lowercase or uppercase names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "TRACE")]
    Trace,
    #[serde(alias = "DEBUG")]
    Debug,
    #[default]
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN", alias = "WARNING", alias = "warning")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Longest accepted tick period or autoscale interval: one day.
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

fn default_checkin_frequency_loop_secs() -> f64 {
    5.0
}

fn default_num_replicas() -> u32 {
    1
}

fn default_num_cpus() -> f64 {
    1.0
}

fn default_num_concurrency() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_min_replicas() -> u32 {
    1
}

fn default_max_replicas() -> u32 {
    1000
}

fn default_autoscale_frequency_secs() -> f64 {
    60.0
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            processor_options: HashMap::new(),
            checkin_frequency_loop_secs: default_checkin_frequency_loop_secs(),
            log_level: LogLevel::default(),
        }
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            num_replicas: default_num_replicas(),
            num_cpus: default_num_cpus(),
            num_concurrency: default_num_concurrency(),
            autoscaler_options: AutoscalerOptions::default(),
        }
    }
}

impl Default for AutoscalerOptions {
    fn default() -> Self {
        Self {
            enable_autoscaler: true,
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
            autoscale_frequency_secs: default_autoscale_frequency_secs(),
        }
    }
}

impl RuntimeOptions {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let options = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            groups = options.processor_options.len(),
            "loaded runtime options"
        );
        Ok(options)
    }

    /// Parse and validate options from TOML text.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let options: RuntimeOptions = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Register options for a group, replacing any previous entry.
    pub fn with_processor_options(
        mut self,
        group_id: impl Into<String>,
        options: ProcessorOptions,
    ) -> Self {
        self.processor_options.insert(group_id.into(), options);
        self
    }

    pub fn with_checkin_frequency_secs(mut self, secs: f64) -> Self {
        self.checkin_frequency_loop_secs = secs;
        self
    }

    /// Options for a group, or an error if the group was never configured.
    pub fn processor_options(&self, group_id: &str) -> ConfigResult<&ProcessorOptions> {
        self.processor_options
            .get(group_id)
            .ok_or_else(|| ConfigError::MissingProcessorOptions(group_id.to_string()))
    }

    /// Supervision loop tick period. Only meaningful after [`validate`](Self::validate).
    pub fn checkin_interval(&self) -> Duration {
        interval_from_secs(self.checkin_frequency_loop_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let tick = self.checkin_frequency_loop_secs;
        if !tick.is_finite() || tick <= 0.0 || tick > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "checkin_frequency_loop_secs".to_string(),
                reason: format!("must be in (0, {MAX_INTERVAL_SECS}] seconds, got {tick}"),
            });
        }
        for (group_id, options) in &self.processor_options {
            options.validate(group_id)?;
        }
        Ok(())
    }
}

impl ProcessorOptions {
    fn validate(&self, group_id: &str) -> ConfigResult<()> {
        let autoscaler = &self.autoscaler_options;
        let freq = autoscaler.autoscale_frequency_secs;
        if !freq.is_finite() || !(0.0..=MAX_INTERVAL_SECS).contains(&freq) {
            return Err(ConfigError::Invalid {
                field: format!("{group_id}.autoscaler_options.autoscale_frequency_secs"),
                reason: format!("must be in [0, {MAX_INTERVAL_SECS}] seconds, got {freq}"),
            });
        }
        if autoscaler.min_replicas > autoscaler.max_replicas {
            return Err(ConfigError::Invalid {
                field: format!("{group_id}.autoscaler_options"),
                reason: format!(
                    "min_replicas ({}) exceeds max_replicas ({})",
                    autoscaler.min_replicas, autoscaler.max_replicas
                ),
            });
        }
        Ok(())
    }
}

impl AutoscalerOptions {
    /// Minimum interval between scale attempts.
    pub fn autoscale_interval(&self) -> Duration {
        interval_from_secs(self.autoscale_frequency_secs)
    }

    /// Clamp a replica count into `[min_replicas, max_replicas]`.
    pub fn clamp_replicas(&self, replicas: u32) -> u32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

/// Seconds to a `Duration`, capped at [`MAX_INTERVAL_SECS`]. Negative input
/// yields zero; NaN yields the cap.
fn interval_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(MAX_INTERVAL_SECS)).unwrap_or(Duration::ZERO)
}
