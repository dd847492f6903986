//! Persisted tunable store.
//!
//! A flat, namespaced key/value file. Each tunable the user saved has one
//! string entry (`saved_governor` → `"schedutil"`); two boolean control
//! flags sit alongside them. The file is JSON:
//!
//! ```json
//! {
//!   "namespace": "tweaks",
//!   "entries": {
//!     "run_on_boot": true,
//!     "saved_governor": "schedutil",
//!     "saved_swappiness": "60"
//!   }
//! }
//! ```
//!
//! Entries are kept in a `BTreeMap`, so iteration order (and the saved
//! file) is deterministic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Run the applier automatically at boot.
pub const RUN_ON_BOOT: &str = "run_on_boot";

/// Set while the applier owns the device tunables.
pub const SERVICE_RUNNING: &str = "service_running";

pub const DEFAULT_NAMESPACE: &str = "tweaks";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid store: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for dt_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Parse { path, source } => dt_common::Error::StoreCorrupted {
                path: path.display().to_string(),
                reason: source.to_string(),
            },
            other => dt_common::Error::Store(other.to_string()),
        }
    }
}

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Bool(bool),
    Text(String),
}

impl StoreValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::Text(s) => Some(s),
            StoreValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Bool(b) => Some(*b),
            StoreValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default)]
    entries: BTreeMap<String, StoreValue>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// The tunable store, bound to a file path.
#[derive(Debug, Clone)]
pub struct TunableStore {
    path: PathBuf,
    namespace: String,
    entries: BTreeMap<String, StoreValue>,
}

impl TunableStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file absent, starting empty");
                return Ok(Self::in_memory_at(path));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        if content.trim().is_empty() {
            return Ok(Self::in_memory_at(path));
        }

        let file: StoreFile = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            namespace: file.namespace,
            entries: file.entries,
        })
    }

    /// An empty store that will save to `path`.
    pub fn in_memory_at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            namespace: default_namespace(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, key: &str) -> Option<&StoreValue> {
        self.entries.get(key)
    }

    /// String value for `key`, if present and textual.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(StoreValue::as_str)
    }

    /// Boolean flag, falling back to `default` when absent or textual.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.entries
            .get(key)
            .and_then(StoreValue::as_bool)
            .unwrap_or(default)
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), StoreValue::Text(value.into()));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.entries.insert(key.into(), StoreValue::Bool(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<StoreValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, StoreValue> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_json(&self) -> String {
        let file = StoreFile {
            namespace: self.namespace.clone(),
            entries: self.entries.clone(),
        };
        // BTreeMap<String, _> of strings/bools always serializes.
        serde_json::to_string_pretty(&file).unwrap_or_else(|_| "{}".to_string())
    }

    /// Write the store, replacing the file atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, self.to_json()).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "store saved");
        Ok(())
    }

    /// SHA-256 of the serialized store.
    pub fn content_hash(&self) -> String {
        crate::snapshot::hash_content(&self.to_json())
    }
}
