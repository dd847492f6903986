//! Settings resolution and path discovery.
//!
//! Resolution order: CLI argument → environment → XDG → /etc → defaults.

use std::path::{Path, PathBuf};

use crate::APP_NAME;

/// Where the settings file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/device-tuner/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Resolved settings file location.
#[derive(Debug, Clone, Default)]
pub struct SettingsPath {
    /// Path to settings.json, or None when defaults apply.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

const ENV_SETTINGS_PATH: &str = "DT_SETTINGS";
const ENV_CONFIG_DIR: &str = "DT_CONFIG_DIR";
const SETTINGS_FILENAME: &str = "settings.json";

/// Resolve the settings file path.
///
/// 1. Explicit CLI path (if it exists)
/// 2. `DT_SETTINGS`
/// 3. `DT_CONFIG_DIR` + settings.json
/// 4. XDG config directory (~/.config/device-tuner/)
/// 5. System config (/etc/device-tuner/)
/// 6. Built-in defaults (None)
pub fn resolve_settings(cli_path: Option<&Path>) -> SettingsPath {
    resolve_with(cli_path, |key| std::env::var(key).ok(), dirs::config_dir())
}

fn resolve_with<F>(cli_path: Option<&Path>, env: F, xdg_base: Option<PathBuf>) -> SettingsPath
where
    F: Fn(&str) -> Option<String>,
{
    let found = |path: PathBuf, source| SettingsPath {
        path: Some(path),
        source,
    };

    if let Some(path) = cli_path {
        if path.exists() {
            return found(path.to_path_buf(), ConfigSource::CliArgument);
        }
    }

    if let Some(env_path) = env(ENV_SETTINGS_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(dir) = env(ENV_CONFIG_DIR) {
        let path = PathBuf::from(dir).join(SETTINGS_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(base) = xdg_base {
        let path = base.join(APP_NAME).join(SETTINGS_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(SETTINGS_FILENAME);
    if system_path.exists() {
        return found(system_path, ConfigSource::SystemConfig);
    }

    SettingsPath::default()
}

/// System config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
