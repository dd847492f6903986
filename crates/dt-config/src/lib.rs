//! Device Tuner configuration loading and persisted state.
//!
//! This crate provides:
//! - Typed engine settings (shell, tuning, poll, filesystem root)
//! - Settings resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Settings snapshots with content hashes
//! - The flat key/value tunable store read by the applier

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use resolve::{resolve_settings, ConfigSource, SettingsPath};
pub use settings::{EngineSettings, PollSettings, ShellSettings, TuningSettings};
pub use snapshot::SettingsSnapshot;
pub use store::{StoreError, StoreValue, TunableStore, RUN_ON_BOOT, SERVICE_RUNNING};
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Schema version for settings files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Application name used for XDG and /etc directories.
pub const APP_NAME: &str = "device-tuner";
