//! Shared types used across flowgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for one orchestrator lifetime.
///
/// Assigned once when a runtime is built and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh random run id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Processor groups ───────────────────────────────────────────────

/// The pattern a processor group runs under.
///
/// Unknown type names are rejected when a group is deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorType {
    /// Pulls from a source and pushes to a sink.
    Consumer,
    /// Receives pushed requests and writes them to a sink.
    Collector,
    /// Serves request/response traffic.
    Endpoint,
    /// Declared, not implemented by any pool.
    Connection,
}

impl ProcessorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorType::Consumer => "CONSUMER",
            ProcessorType::Collector => "COLLECTOR",
            ProcessorType::Endpoint => "ENDPOINT",
            ProcessorType::Connection => "CONNECTION",
        }
    }
}

impl fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single processor inside a group. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub processor_id: String,
    /// Free-form settings handed to the pool (source/sink bindings etc).
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Immutable specification of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorGroup {
    /// Unique within a run.
    pub group_id: String,
    pub group_type: ProcessorType,
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,
}

impl ProcessorGroup {
    /// Build a group with no processor definitions.
    pub fn new(group_id: impl Into<String>, group_type: ProcessorType) -> Self {
        Self {
            group_id: group_id.into(),
            group_type,
            processors: Vec::new(),
        }
    }
}

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle status shared by the orchestrator and every pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    #[default]
    Idle,
    Running,
    Draining,
}

impl RuntimeStatus {
    /// Anything other than `Idle`.
    pub fn is_active(self) -> bool {
        self != RuntimeStatus::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeStatus::Idle => "IDLE",
            RuntimeStatus::Running => "RUNNING",
            RuntimeStatus::Draining => "DRAINING",
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
