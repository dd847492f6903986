//! Root detection.
//!
//! Run [`RootIdentity::detect`] once, before the first snapshot, and pass
//! the value along. Nothing here caches implicitly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::shell::ShellExecutor;
use crate::sysfs::NodeReader;

/// Well-known elevation binaries and manager footprints.
pub const SU_PATHS: &[&str] = &[
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
    "/sbin/magisk",
    "/data/adb/magisk",
    "/data/adb/ksu",
    "/data/adb/apatch",
];

pub const MANAGER_NONE: &str = dt_common::sentinel::NONE;
pub const MANAGER_TRADITIONAL: &str = "Rooted (Traditional)";

/// How root was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootEvidence {
    /// `id` ran successfully through the elevated shell.
    IdentityCommand,
    /// A known su binary or manager directory exists.
    KnownPath,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootIdentity {
    pub is_rooted: bool,
    pub manager_name: String,
    pub evidence: RootEvidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_path: Option<String>,
}

impl RootIdentity {
    /// Probe the device once.
    pub fn detect(shell: &dyn ShellExecutor, fs: &dyn NodeReader) -> Self {
        let (is_rooted, evidence, matched_path) = if shell.exec("id").success {
            (true, RootEvidence::IdentityCommand, None)
        } else if let Some(path) = SU_PATHS.iter().find(|p| fs.exists(p)) {
            (true, RootEvidence::KnownPath, Some((*path).to_string()))
        } else {
            (false, RootEvidence::None, None)
        };

        let banner = shell.version_banner().unwrap_or_default();
        let manager_name = classify_manager(&banner, is_rooted);
        debug!(is_rooted, %manager_name, ?evidence, "root detected");

        Self {
            is_rooted,
            manager_name,
            evidence,
            matched_path,
        }
    }

    pub fn unrooted() -> Self {
        Self {
            is_rooted: false,
            manager_name: MANAGER_NONE.to_string(),
            evidence: RootEvidence::None,
            matched_path: None,
        }
    }
}

/// Map a version banner to a product label.
///
/// Case-insensitive substring match. An unrecognised banner becomes
/// `Rooted (Unknown: <banner>)`; a blank one depends on `is_rooted`.
pub fn classify_manager(banner: &str, is_rooted: bool) -> String {
    let trimmed = banner.trim();
    let upper = trimmed.to_uppercase();
    if upper.contains("MAGISK") {
        "Magisk".to_string()
    } else if upper.contains("KERNELSU") || upper.contains("KSU") {
        "KernelSU".to_string()
    } else if upper.contains("APATCH") {
        "APatch".to_string()
    } else if !trimmed.is_empty() {
        format!("Rooted (Unknown: {trimmed})")
    } else if is_rooted {
        MANAGER_TRADITIONAL.to_string()
    } else {
        MANAGER_NONE.to_string()
    }
}
