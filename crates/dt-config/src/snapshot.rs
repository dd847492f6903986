//! Settings snapshots for provenance.
//!
//! Captures the resolved settings and where they came from so that a
//! poll/apply run can be tied back to the exact configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::SettingsPath;
use crate::settings::EngineSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// Path settings were loaded from.
    #[serde(default)]
    pub path: Option<String>,

    pub source: String,

    /// SHA-256 of the settings file content, when a file was read.
    #[serde(default)]
    pub content_hash: Option<String>,

    pub settings: EngineSettings,
}

impl SettingsSnapshot {
    pub fn new(settings: &EngineSettings, resolved: &SettingsPath, content: Option<&str>) -> Self {
        SettingsSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            path: resolved.path.as_ref().map(|p| p.display().to_string()),
            source: resolved.source.to_string(),
            content_hash: content.map(hash_content),
            settings: settings.clone(),
        }
    }
}

/// SHA-256 of a string, hex encoded.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ConfigSource;

    #[test]
    fn test_hash_content_deterministic() {
        let a = hash_content(r#"{"poll":{"interval_ms":1000}}"#);
        assert_eq!(a, hash_content(r#"{"poll":{"interval_ms":1000}}"#));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_content("{}"));
    }

    #[test]
    fn defaults_have_no_hash() {
        let snap = SettingsSnapshot::new(&EngineSettings::default(), &SettingsPath::default(), None);
        assert!(snap.content_hash.is_none());
        assert_eq!(snap.source, ConfigSource::BuiltinDefault.to_string());
    }
}
