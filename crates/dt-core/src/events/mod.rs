//! Progress events published while tunables are applied.
//!
//! Each event is the triple the notification surface renders:
//! `(status, step, total)`. Sinks implement [`ProgressEmitter`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;

/// Standard progress event names.
pub mod event_names {
    pub const APPLY_STARTED: &str = "apply_started";
    pub const APPLY_PROGRESS: &str = "apply_progress";
    pub const APPLY_COMPLETE: &str = "apply_complete";
}

/// Status texts shown while tuning.
pub mod status {
    pub const STARTING: &str = "Forging system...";
    pub const APPLYING: &str = "Applying tweaks...";
    pub const ACTIVE: &str = "Optimizations Active & Protected";
}

/// Structured progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub step: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn new(event: impl Into<String>, status: impl Into<String>, step: usize, total: usize) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            status: status.into(),
            step,
            total,
        }
    }

    pub fn started(total: usize) -> Self {
        Self::new(event_names::APPLY_STARTED, status::STARTING, 0, total)
    }

    pub fn progress(step: usize, total: usize) -> Self {
        Self::new(event_names::APPLY_PROGRESS, status::APPLYING, step, total)
    }

    pub fn complete(total: usize) -> Self {
        Self::new(event_names::APPLY_COMPLETE, status::ACTIVE, total, total)
    }

    pub fn is_terminal(&self) -> bool {
        self.event == event_names::APPLY_COMPLETE
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Sink for progress events.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Writes each event as one JSON line.
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> ProgressEmitter for JsonlWriter<W> {
    fn emit(&self, event: ProgressEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

/// Discards everything. Used for headless boot runs.
pub struct NullEmitter;

impl ProgressEmitter for NullEmitter {
    fn emit(&self, _event: ProgressEvent) {}
}
