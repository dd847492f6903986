//! Settings loading against files on disk.

use dt_config::{
    resolve_settings, validate_settings, ConfigSource, EngineSettings, SettingsSnapshot,
};
use tempfile::TempDir;

#[test]
fn load_validate_and_snapshot_cli_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": "1.0.0",
            "shell": {"binary": "/system/bin/su"},
            "tuning": {"batch_timeout_secs": 45},
            "poll": {"interval_ms": 2000}
        }"#,
    )
    .unwrap();

    let resolved = resolve_settings(Some(&path));
    assert_eq!(resolved.source, ConfigSource::CliArgument);

    let (settings, content) = EngineSettings::load(resolved.path.as_deref().unwrap()).unwrap();
    validate_settings(&settings).unwrap();
    assert_eq!(settings.shell.binary, "/system/bin/su");
    assert_eq!(settings.shell.command_timeout_ms, 5_000);
    assert_eq!(settings.tuning.batch_timeout_secs, 45);

    let snap = SettingsSnapshot::new(&settings, &resolved, Some(&content));
    assert_eq!(snap.content_hash.as_deref().map(str::len), Some(64));
    assert_eq!(snap.source, "CLI argument");
}

#[test]
fn invalid_values_surface_as_config_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"poll": {"interval_ms": 10}}"#).unwrap();

    let (settings, _) = EngineSettings::load(&path).unwrap();
    let err: dt_common::Error = validate_settings(&settings).unwrap_err().into();
    assert_eq!(err.code(), 10);
    assert!(err.to_string().contains("poll.interval_ms"));
}
