//! Schema versioning for documents written to stdout.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Version of the snapshot/progress document layout.
///
/// Bump on any breaking change to field names or meanings.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Header stamped on every top-level document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaStamp {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
}

impl SchemaStamp {
    pub fn now() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for SchemaStamp {
    fn default() -> Self {
        Self::now()
    }
}
