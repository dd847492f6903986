//! Tracing layer that writes one [`LogEvent`] per line.
//!
//! `run_id`, `device` and `stage` are lifted out of the event fields, or
//! inherited from the nearest enclosing span that recorded them.

use std::io::{self, Write};
use std::sync::Mutex;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::{Level, LogEvent};

const CORRELATION_KEYS: [&str; 3] = ["run_id", "device", "stage"];

/// Correlation ids recorded on a span.
#[derive(Debug, Clone, Default)]
struct Correlation {
    run_id: Option<String>,
    device: Option<String>,
    stage: Option<String>,
}

impl Correlation {
    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "run_id" => Some(&mut self.run_id),
            "device" => Some(&mut self.device),
            "stage" => Some(&mut self.stage),
            _ => None,
        }
    }

    /// Fill whatever is still missing from `outer`.
    fn inherit(&mut self, outer: &Correlation) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&outer.run_id);
        }
        if self.device.is_none() {
            self.device.clone_from(&outer.device);
        }
        if self.stage.is_none() {
            self.stage.clone_from(&outer.stage);
        }
    }
}

/// Collects every field as JSON, keeping the message apart.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: serde_json::Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }

    fn take_correlation(&mut self) -> Correlation {
        let mut found = Correlation::default();
        for key in CORRELATION_KEYS {
            if let Some(value) = self.fields.remove(key) {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                if let Some(slot) = found.slot(key) {
                    *slot = Some(text);
                }
            }
        }
        found
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::from(format!("{value:?}")));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }
}

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(collector.take_correlation());
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let mut correlation = collector.take_correlation();

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(outer) = span.extensions().get::<Correlation>() {
                    correlation.inherit(outer);
                }
            }
        }

        let mut line = LogEvent::new(Level::from(*event.metadata().level()), event.metadata().target());
        line.run_id = correlation.run_id;
        line.device = correlation.device;
        line.stage = correlation.stage;
        line.message = collector.message;
        line.fields = collector.fields.into_iter().collect();

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line.to_jsonl());
        }
    }
}
