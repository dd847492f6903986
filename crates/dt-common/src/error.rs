//! Error types for Device Tuner.
//!
//! Only boundary failures live here: configuration that cannot be parsed,
//! a tunable store that cannot be written, a command line that names a
//! tunable that does not exist. Unavailable facts are never errors; they
//! surface as sentinel values (see [`crate::sentinel`]).
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Unknown Tunable
//!   Reason: unknown tunable key: saved_bogus
//!   Fix: Run 'dt-core tunables list' to see the supported keys.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 40,
//!   "category": "tuning",
//!   "message": "unknown tunable key: saved_bogus",
//!   "recoverable": false,
//!   "suggested_action": "run_check",
//!   "context": { "key": "saved_bogus" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Device Tuner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Engine settings file errors.
    Config,
    /// Persisted tunable store errors.
    Store,
    /// Root access errors.
    Shell,
    /// Tunable catalog and application errors.
    Tuning,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Shell => write!(f, "shell"),
            ErrorCategory::Tuning => write!(f, "tuning"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for agents to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Reset configuration to defaults.
    ResetConfig,
    /// Run a listing/validation command.
    RunCheck,
    /// Grant root to the shell binary.
    Elevate,
    /// Skip this item and continue.
    Skip,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::ResetConfig => write!(f, "reset_config"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::Elevate => write!(f, "elevate"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for Device Tuner.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid settings file {path}: {reason}")]
    InvalidSettings { path: String, reason: String },

    // Store errors (20-29)
    #[error("tunable store error: {0}")]
    Store(String),

    #[error("tunable store corrupted at {path}: {reason}")]
    StoreCorrupted { path: String, reason: String },

    // Shell errors (30-39)
    #[error("root access not granted")]
    RootDenied,

    // Tuning errors (40-49)
    #[error("unknown tunable key: {key}")]
    UnknownTunable { key: String },

    #[error("tunable {key} has no writable target on this device")]
    TunableUnwritable { key: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Codes are stable and grouped by category:
    /// - 10-19: Configuration
    /// - 20-29: Store
    /// - 30-39: Shell
    /// - 40-49: Tuning
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidSettings { .. } => 11,
            Error::Store(_) => 20,
            Error::StoreCorrupted { .. } => 21,
            Error::RootDenied => 31,
            Error::UnknownTunable { .. } => 40,
            Error::TunableUnwritable { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidSettings { .. } => ErrorCategory::Config,
            Error::Store(_) | Error::StoreCorrupted { .. } => ErrorCategory::Store,
            Error::RootDenied => ErrorCategory::Shell,
            Error::UnknownTunable { .. } | Error::TunableUnwritable { .. } => ErrorCategory::Tuning,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidSettings { .. } => true,
            Error::Store(_) => true,
            Error::StoreCorrupted { .. } => true, // can be reset
            Error::RootDenied => true, // grant in the root manager
            Error::UnknownTunable { .. } => false,
            Error::TunableUnwritable { .. } => false,
            Error::Io(_) | Error::Json(_) => true,
        }
    }

    /// Returns the suggested action for agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidSettings { .. } => SuggestedAction::ResetConfig,
            Error::Store(_) => SuggestedAction::Retry,
            Error::StoreCorrupted { .. } => SuggestedAction::ResetConfig,
            Error::RootDenied => SuggestedAction::Elevate,
            Error::UnknownTunable { .. } => SuggestedAction::RunCheck,
            Error::TunableUnwritable { .. } => SuggestedAction::Skip,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Run 'dt-core config show' to inspect the resolved settings.",
            Error::InvalidSettings { .. } => {
                "Fix the JSON syntax in settings.json, or delete it to fall back to defaults."
            }
            Error::Store(_) => "Check that the store directory exists and is writable.",
            Error::StoreCorrupted { .. } => {
                "The tunable store is not valid JSON. Delete it and re-save your tunables."
            }
            Error::RootDenied => "Grant root access to this binary in your root manager.",
            Error::UnknownTunable { .. } => {
                "Run 'dt-core tunables list' to see the supported keys."
            }
            Error::TunableUnwritable { .. } => {
                "This kernel does not expose the node. The tunable cannot be applied here."
            }
            Error::Io(_) => "Check disk space and permissions, then retry.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq .' or restore from backup.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidSettings { .. } => "Invalid Settings File",
            Error::Store(_) => "Tunable Store Error",
            Error::StoreCorrupted { .. } => "Tunable Store Corrupted",
            Error::RootDenied => "Root Denied",
            Error::UnknownTunable { .. } => "Unknown Tunable",
            Error::TunableUnwritable { .. } => "Tunable Not Writable",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for agents.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g. key, path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidSettings { path, .. } | Error::StoreCorrupted { path, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            Error::UnknownTunable { key } | Error::TunableUnwritable { key } => {
                context.insert("key".to_string(), serde_json::json!(key));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(Error::RootDenied.code(), 31);
        assert_eq!(Error::TunableUnwritable { key: "k".into() }.code(), 41);
    }

    #[test]
    fn test_codes_fall_in_category_band() {
        let samples = [
            Error::InvalidSettings {
                path: "a".into(),
                reason: "b".into(),
            },
            Error::StoreCorrupted {
                path: "a".into(),
                reason: "b".into(),
            },
            Error::RootDenied,
            Error::UnknownTunable { key: "k".into() },
            Error::Io(std::io::Error::other("disk")),
        ];
        for err in &samples {
            let band = match err.category() {
                ErrorCategory::Config => 10..20,
                ErrorCategory::Store => 20..30,
                ErrorCategory::Shell => 30..40,
                ErrorCategory::Tuning => 40..50,
                ErrorCategory::Io => 60..70,
            };
            assert!(band.contains(&err.code()), "{err} code {}", err.code());
        }
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::RootDenied.is_recoverable());
        assert!(!Error::UnknownTunable { key: "k".into() }.is_recoverable());
        assert!(Error::Store("busy".into()).is_recoverable());
    }

    #[test]
    fn test_structured_error_context() {
        let err = Error::UnknownTunable {
            key: "saved_bogus".into(),
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 40);
        assert_eq!(structured.category, ErrorCategory::Tuning);
        assert_eq!(structured.suggested_action, SuggestedAction::RunCheck);
        assert_eq!(
            structured.context.get("key"),
            Some(&serde_json::json!("saved_bogus"))
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::StoreCorrupted {
            path: "/data/tweaks.json".into(),
            reason: "eof".into(),
        };
        let json = StructuredError::from(&err).to_json();
        assert!(json.contains(r#""code":21"#));
        assert!(json.contains(r#""category":"store""#));
        assert!(json.contains(r#""path":"/data/tweaks.json""#));
    }

    #[test]
    fn test_format_error_human() {
        let formatted = format_error_human(&Error::RootDenied, false);
        assert!(formatted.contains("Root Denied"));
        assert!(formatted.contains("root access not granted"));
        assert!(formatted.contains("root manager"));
        assert!(!formatted.contains("\x1b["));
    }
}
