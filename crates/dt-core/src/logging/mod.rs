//! Structured logging for dt-core.
//!
//! Two output modes, both on stderr:
//! - human-readable console lines for interactive use
//! - JSONL for boot scripts and log collectors
//!
//! stdout is reserved for command payloads.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, LogEvent, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call is a no-op.
pub fn init_logging(config: &LogConfig) {
    // Events are targeted by name ("apply.started"), not by module path,
    // so the default directive is a bare level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());

            if config.timestamps {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init();
            } else {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init();
            }
        }
        LogFormat::Jsonl => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(JsonlLayer::stderr())
                .try_init();
        }
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Emit a tracing event carrying the context's correlation ids.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::APPLY_STARTED, Stage::Apply, "applying", total = 12);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            target: $event,
            run_id = %$ctx.run_id,
            device = %$ctx.device,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            target: $event,
            run_id = %$ctx.run_id,
            device = %$ctx.device,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            target: $event,
            run_id = %$ctx.run_id,
            device = %$ctx.device,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert!(id1.starts_with("run-"));
        assert_eq!(id1.len(), 16);
        assert_ne!(id1, id2);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
