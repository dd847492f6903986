//! DRM capability query.
//!
//! Queried fresh each time a static snapshot is built. Any failure,
//! including a single missing property, collapses every field to
//! "Not Supported".

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use dt_common::sentinel::{NOT_SUPPORTED, UNKNOWN};

/// Widevine scheme id.
pub const WIDEVINE_UUID: Uuid = Uuid::from_u128(0xedef8ba9_79d6_4ace_a3c8_27dcd51d21ed);

pub mod property {
    pub const VENDOR: &str = "vendor";
    pub const VERSION: &str = "version";
    pub const DESCRIPTION: &str = "description";
    pub const ALGORITHMS: &str = "algorithms";
    pub const SECURITY_LEVEL: &str = "securityLevel";
    pub const MAX_HDCP_LEVEL: &str = "maxHdcpLevel";
}

#[derive(Debug, Error)]
pub enum DrmError {
    #[error("scheme {0} not supported")]
    UnsupportedScheme(Uuid),

    #[error("failed to query {property}: {reason}")]
    Property { property: String, reason: String },
}

/// A DRM plugin for one scheme.
pub trait DrmProvider: Send + Sync {
    /// Property string; `Ok(None)` when the plugin has no value for it.
    fn property(&self, scheme: Uuid, name: &str) -> Result<Option<String>, DrmError>;
}

/// No DRM framework reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDrm;

impl DrmProvider for UnavailableDrm {
    fn property(&self, scheme: Uuid, _name: &str) -> Result<Option<String>, DrmError> {
        Err(DrmError::UnsupportedScheme(scheme))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmInfo {
    pub vendor: String,
    pub version: String,
    pub description: String,
    pub algorithms: String,
    pub security_level: String,
    pub max_hdcp_level: String,
}

impl DrmInfo {
    pub fn not_supported() -> Self {
        let ns = || NOT_SUPPORTED.to_string();
        Self {
            vendor: ns(),
            version: ns(),
            description: ns(),
            algorithms: ns(),
            security_level: ns(),
            max_hdcp_level: ns(),
        }
    }

    /// Query the Widevine plugin.
    pub fn query(provider: &dyn DrmProvider) -> Self {
        match Self::try_query(provider, WIDEVINE_UUID) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(error = %e, "drm query failed");
                Self::not_supported()
            }
        }
    }

    fn try_query(provider: &dyn DrmProvider, scheme: Uuid) -> Result<Self, DrmError> {
        let get = |name: &str| -> Result<String, DrmError> {
            Ok(provider
                .property(scheme, name)?
                .unwrap_or_else(|| UNKNOWN.to_string()))
        };
        Ok(Self {
            vendor: get(property::VENDOR)?,
            version: get(property::VERSION)?,
            description: get(property::DESCRIPTION)?,
            algorithms: get(property::ALGORITHMS)?,
            security_level: get(property::SECURITY_LEVEL)?,
            max_hdcp_level: get(property::MAX_HDCP_LEVEL)?,
        })
    }
}
