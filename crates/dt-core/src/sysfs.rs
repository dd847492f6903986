//! Access to kernel virtual-filesystem nodes.
//!
//! Every path in the engine is written as it appears on the device
//! (`/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor`). A
//! [`NodeReader`] maps those to real files, optionally under a root prefix
//! so a captured tree can be replayed off-device.

use std::path::{Path, PathBuf};

/// Read-only view of kernel nodes.
pub trait NodeReader: Send + Sync {
    /// Host path for a device path.
    fn resolve(&self, path: &str) -> PathBuf;

    fn exists(&self, path: &str) -> bool;

    /// Raw file content, `None` when missing or unreadable.
    fn read(&self, path: &str) -> Option<String>;

    /// Entry names of a directory, sorted. Empty when unreadable.
    fn list_dir(&self, path: &str) -> Vec<String>;

    /// Trimmed, non-empty content.
    fn read_trimmed(&self, path: &str) -> Option<String> {
        self.read(path)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Content parsed as a signed integer.
    fn read_i64(&self, path: &str) -> Option<i64> {
        self.read_trimmed(path)?.parse().ok()
    }

    /// Path as the elevated shell should see it.
    fn shell_path(&self, path: &str) -> String {
        self.resolve(path).display().to_string()
    }
}

/// The real filesystem, optionally re-rooted.
#[derive(Debug, Clone, Default)]
pub struct HostFs {
    root: Option<PathBuf>,
}

impl HostFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_optional_root(root: Option<&Path>) -> Self {
        Self {
            root: root.map(Path::to_path_buf),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

impl NodeReader for HostFs {
    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.resolve(path)).ok()
    }

    fn list_dir(&self, path: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.resolve(path))
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
