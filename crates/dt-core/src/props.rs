//! System property lookup.
//!
//! Core logic only sees [`PropertyStore::get`]. Adapters: the live
//! `getprop` service, `build.prop` files, and an in-memory map.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

/// String-keyed property lookup with a caller-supplied default.
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str, default: &str) -> String;

    /// Value, or `None` when unset or blank.
    fn get_opt(&self, key: &str) -> Option<String> {
        let v = self.get(key, "");
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    }

    /// `true` for `true` or `1`, case-insensitive.
    fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get(key, "").trim().to_ascii_lowercase().as_str(),
            "true" | "1"
        )
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get_opt(key)?.parse().ok()
    }
}

/// Live properties through the `getprop` binary.
#[derive(Debug, Clone)]
pub struct GetpropStore {
    binary: String,
}

impl Default for GetpropStore {
    fn default() -> Self {
        Self {
            binary: "getprop".to_string(),
        }
    }
}

impl GetpropStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for GetpropStore {
    fn get(&self, key: &str, default: &str) -> String {
        let output = Command::new(&self.binary)
            .arg(key)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if value.is_empty() {
                    default.to_string()
                } else {
                    value
                }
            }
            _ => default.to_string(),
        }
    }
}

/// Properties held in memory.
#[derive(Debug, Clone, Default)]
pub struct MapPropertyStore {
    values: BTreeMap<String, String>,
}

impl MapPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Parse `key=value` lines; `#` comments and blank lines are skipped.
    /// Later lines override earlier ones.
    pub fn parse_build_prop(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    self.values.insert(key.to_string(), value.trim().to_string());
                }
            }
        }
    }

    /// Load one or more `build.prop` files. Unreadable files are skipped.
    pub fn from_build_props<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut store = Self::new();
        for path in paths {
            if let Ok(content) = std::fs::read_to_string(path) {
                store.parse_build_prop(&content);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PropertyStore for MapPropertyStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_prop_parsing() {
        let mut store = MapPropertyStore::new();
        store.parse_build_prop(
            "# begin build properties\n\
             ro.product.model=Pixel 7\n\
             \n\
             ro.build.fingerprint = google/panther/panther:14/UQ1A/1:user/release-keys\n\
             ro.product.model=Pixel 7 Pro\n\
             not-a-property\n",
        );
        assert_eq!(store.get("ro.product.model", ""), "Pixel 7 Pro");
        assert!(store.get("ro.build.fingerprint", "").starts_with("google/"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn default_applies_when_missing() {
        let store = MapPropertyStore::new();
        assert_eq!(store.get("ro.treble.enabled", "false"), "false");
        assert_eq!(store.get_opt("ro.treble.enabled"), None);
    }

    #[test]
    fn bool_and_int_helpers() {
        let store = MapPropertyStore::new()
            .with("ro.treble.enabled", "TRUE")
            .with("ro.virtual_ab.enabled", "false")
            .with("ro.build.version.sdk", "34");
        assert!(store.get_bool("ro.treble.enabled"));
        assert!(!store.get_bool("ro.virtual_ab.enabled"));
        assert!(!store.get_bool("ro.absent"));
        assert_eq!(store.get_int("ro.build.version.sdk"), Some(34));
    }
}
