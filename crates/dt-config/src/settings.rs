//! Engine settings.
//!
//! Every field has a default, so an empty `{}` file (or no file at all)
//! yields a working configuration for a stock rooted device.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use dt_common::Error;

/// Environment overrides for single fields.
pub const ENV_SHELL: &str = "DT_SHELL";
pub const ENV_FS_ROOT: &str = "DT_FS_ROOT";
pub const ENV_STORE: &str = "DT_STORE";

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    pub shell: ShellSettings,

    pub tuning: TuningSettings,

    pub poll: PollSettings,

    /// Prefix applied to every kernel virtual-filesystem path.
    ///
    /// Used to replay a captured device tree on a workstation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_root: Option<PathBuf>,

    /// `build.prop`-style file used instead of the live property service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props_file: Option<PathBuf>,

    /// Explicit location of the tunable store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

/// Privileged shell invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ShellSettings {
    /// Binary that accepts `-c <command>` and reads a script on stdin.
    pub binary: String,
    /// Flag that prints the root manager banner.
    pub version_flag: String,
    /// Budget for a one-shot command.
    pub command_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TuningSettings {
    pub batch_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            shell: ShellSettings::default(),
            tuning: TuningSettings::default(),
            poll: PollSettings::default(),
            fs_root: None,
            props_file: None,
            store_path: None,
        }
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            binary: "su".to_string(),
            version_flag: "-v".to_string(),
            command_timeout_ms: 5_000,
        }
    }
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            batch_timeout_secs: 30,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { interval_ms: 1_000 }
    }
}

impl EngineSettings {
    /// Parse settings from JSON text.
    pub fn from_json(content: &str, origin: &Path) -> Result<Self, Error> {
        serde_json::from_str(content).map_err(|e| Error::InvalidSettings {
            path: origin.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load settings from a file.
    pub fn load(path: &Path) -> Result<(Self, String), Error> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&content, path)?;
        Ok((settings, content))
    }

    /// Apply `DT_SHELL`, `DT_FS_ROOT` and `DT_STORE` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply single-field overrides from an arbitrary lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(shell) = non_empty(ENV_SHELL) {
            self.shell.binary = shell;
        }
        if let Some(root) = non_empty(ENV_FS_ROOT) {
            self.fs_root = Some(PathBuf::from(root));
        }
        if let Some(store) = non_empty(ENV_STORE) {
            self.store_path = Some(PathBuf::from(store));
        }
    }

    /// Where the tunable store lives when no explicit path was configured.
    pub fn effective_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(crate::APP_NAME)
            .join("tweaks.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_object_yields_defaults() {
        let s = EngineSettings::from_json("{}", Path::new("settings.json")).unwrap();
        assert_eq!(s, EngineSettings::default());
        assert_eq!(s.shell.binary, "su");
        assert_eq!(s.tuning.batch_timeout_secs, 30);
        assert_eq!(s.poll.interval_ms, 1000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = EngineSettings::from_json(
            r#"{"tuning": {"batch_timeout_secs": 5}, "fs_root": "/tmp/capture"}"#,
            Path::new("settings.json"),
        )
        .unwrap();
        assert_eq!(s.tuning.batch_timeout_secs, 5);
        assert_eq!(s.fs_root.as_deref(), Some(Path::new("/tmp/capture")));
        assert_eq!(s.shell.version_flag, "-v");
    }

    #[test]
    fn malformed_json_reports_path() {
        let err = EngineSettings::from_json("{", Path::new("/x/settings.json")).unwrap_err();
        assert_eq!(err.code(), 11);
        assert!(err.to_string().contains("/x/settings.json"));
    }

    #[test]
    fn overrides_ignore_blank_values() {
        let env: HashMap<&str, &str> = [(ENV_SHELL, "/bin/sh"), (ENV_FS_ROOT, "  ")]
            .into_iter()
            .collect();
        let mut s = EngineSettings::default();
        s.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.shell.binary, "/bin/sh");
        assert!(s.fs_root.is_none());
    }

    #[test]
    fn explicit_store_path_wins() {
        let s = EngineSettings {
            store_path: Some(PathBuf::from("/data/tweaks.json")),
            ..Default::default()
        };
        assert_eq!(s.effective_store_path(), PathBuf::from("/data/tweaks.json"));
    }
}
