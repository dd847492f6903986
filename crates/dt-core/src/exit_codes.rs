//! Exit codes for the dt-core CLI.
//!
//! Boot scripts read the outcome from the code, never from output.
//!
//! Exit code ranges:
//! - 0-2: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use dt_common::error::ErrorCategory;
use dt_common::Error;

/// Exit codes for dt-core operations.
///
/// Stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-2)
    // ========================================================================
    /// Nothing to do, or a read-only command finished.
    Clean = 0,

    /// A tuning batch was executed.
    TuningApplied = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or settings
    ArgsError = 10,

    /// Required capability missing (no root)
    CapabilityError = 11,

    /// Permission denied
    PermissionError = 12,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::TuningApplied)
    }

    /// Codes below 10 describe what happened, not what went wrong.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::TuningApplied => "OK_APPLIED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::CapabilityError => "ERR_CAPABILITY",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for an engine error.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::RootDenied => ExitCode::CapabilityError,
            Error::TunableUnwritable { .. } => ExitCode::PermissionError,
            Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => ExitCode::PermissionError,
            Error::Json(_) => ExitCode::InternalError,
            _ => match err.category() {
                ErrorCategory::Config | ErrorCategory::Tuning => ExitCode::ArgsError,
                ErrorCategory::Store | ErrorCategory::Io => ExitCode::IoError,
                ErrorCategory::Shell => ExitCode::CapabilityError,
            },
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::TuningApplied.is_operational());
        assert!(ExitCode::CapabilityError.is_user_error());
        assert!(ExitCode::InternalError.is_internal_error());
        assert!(!ExitCode::TuningApplied.is_error());
        assert_eq!(i32::from(ExitCode::PermissionError), 12);
        assert_eq!(ExitCode::IoError.to_string(), "ERR_IO (21)");
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(ExitCode::for_error(&Error::RootDenied), ExitCode::CapabilityError);
        assert_eq!(
            ExitCode::for_error(&Error::UnknownTunable { key: "x".into() }),
            ExitCode::ArgsError
        );
        assert_eq!(
            ExitCode::for_error(&Error::TunableUnwritable { key: "x".into() }),
            ExitCode::PermissionError
        );
        assert_eq!(ExitCode::for_error(&Error::Store("disk".into())), ExitCode::IoError);
        assert_eq!(ExitCode::for_error(&Error::Config("bad".into())), ExitCode::ArgsError);
        assert_eq!(
            ExitCode::for_error(&Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied))),
            ExitCode::PermissionError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Io(std::io::Error::other("disk"))),
            ExitCode::IoError
        );
    }

    #[test]
    fn every_code_has_a_distinct_name() {
        let all = [
            ExitCode::Clean,
            ExitCode::TuningApplied,
            ExitCode::ArgsError,
            ExitCode::CapabilityError,
            ExitCode::PermissionError,
            ExitCode::InternalError,
            ExitCode::IoError,
        ];
        let names: std::collections::BTreeSet<_> = all.iter().map(|c| c.code_name()).collect();
        assert_eq!(names.len(), all.len());
        assert!(all.iter().all(|c| c.as_i32() < 22));
    }
}
