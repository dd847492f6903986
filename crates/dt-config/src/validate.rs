//! Semantic validation of engine settings.

use thiserror::Error;

use crate::settings::EngineSettings;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Settings validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::MissingField(_) => 12,
            ValidationError::InvalidValue { .. } => 13,
            ValidationError::VersionMismatch { .. } => 14,
        }
    }
}

impl From<ValidationError> for dt_common::Error {
    fn from(err: ValidationError) -> Self {
        dt_common::Error::Config(err.to_string())
    }
}

/// Minimum poll interval; anything faster starves the shell.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Validate settings semantically.
pub fn validate_settings(settings: &EngineSettings) -> ValidationResult<()> {
    if settings.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: settings.schema_version.clone(),
        });
    }

    if settings.shell.binary.trim().is_empty() {
        return Err(ValidationError::MissingField("shell.binary".to_string()));
    }

    if settings.shell.command_timeout_ms == 0 {
        return Err(invalid("shell.command_timeout_ms", "must be > 0"));
    }

    if settings.tuning.batch_timeout_secs == 0 {
        return Err(invalid("tuning.batch_timeout_secs", "must be > 0"));
    }

    if settings.poll.interval_ms < MIN_POLL_INTERVAL_MS {
        return Err(invalid(
            "poll.interval_ms",
            &format!("must be >= {MIN_POLL_INTERVAL_MS}"),
        ));
    }

    Ok(())
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
