//! Structured event definitions for logging.
//!
//! Every event carries the run id, the device it ran on, and the
//! engine stage that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Engine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and settings resolution.
    Init,
    /// One-time root detection.
    Root,
    /// Individual fact resolution.
    Probe,
    /// Static snapshot aggregation.
    StaticSnapshot,
    /// Dynamic poll loop.
    Poll,
    /// Tuning batch compilation.
    Build,
    /// Tuning batch execution.
    Apply,
    /// Tunable store reads and writes.
    Store,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Root => "root",
            Stage::Probe => "probe",
            Stage::StaticSnapshot => "static_snapshot",
            Stage::Poll => "poll",
            Stage::Build => "build",
            Stage::Apply => "apply",
            Stage::Store => "store",
        })
    }
}

/// Standard event names used in logging.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const ROOT_DETECTED: &str = "root.detected";

    pub const PROBE_DENIED: &str = "probe.denied";
    pub const PROBE_FALLBACK: &str = "probe.fallback";

    pub const SNAPSHOT_BUILT: &str = "snapshot.built";

    pub const POLL_TICK: &str = "poll.tick";
    pub const POLL_STOPPED: &str = "poll.stopped";

    pub const BUILD_FINISHED: &str = "build.finished";

    pub const APPLY_STARTED: &str = "apply.started";
    pub const APPLY_PROGRESS: &str = "apply.progress";
    pub const APPLY_TIMEOUT: &str = "apply.timeout";
    pub const APPLY_FINISHED: &str = "apply.finished";

    pub const STORE_SAVED: &str = "store.saved";
}

/// One JSONL log line.
///
/// Correlation fields are optional: events emitted outside `log_event!`
/// and outside an enclosing span carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name, taken from the tracing target (e.g. "apply.started").
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEvent {
    pub fn new(level: Level, event: impl Into<String>) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: None,
            device: None,
            stage: None,
            message: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| serde_json::json!({ "event": self.event, "error": "unserializable" }).to_string())
    }
}

/// Correlation ids shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub device: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, device: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            device: device.into(),
        }
    }
}
