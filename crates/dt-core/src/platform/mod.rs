//! Platform query services.
//!
//! Battery, memory, storage, connectivity, display, camera and feature
//! flags come from services the engine treats as opaque: each answer is
//! either a value or `None`. Nothing in this module returns an error.

mod drm;
mod host;

pub use drm::{DrmError, DrmInfo, DrmProvider, UnavailableDrm, WIDEVINE_UUID};
pub use host::HostPlatform;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Physical memory in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// The user data partition in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Charger state as reported by the battery service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    Charging,
    Full,
    Discharging,
    NotCharging,
    #[default]
    Unknown,
}

impl ChargeState {
    /// Parse the `status` node of a power supply.
    pub fn from_sysfs(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "charging" => ChargeState::Charging,
            "full" => ChargeState::Full,
            "discharging" => ChargeState::Discharging,
            "not charging" => ChargeState::NotCharging,
            _ => ChargeState::Unknown,
        }
    }
}

/// What the battery is drawing from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeSource {
    #[serde(rename = "USB")]
    Usb,
    #[serde(rename = "AC")]
    Ac,
    Wireless,
    #[default]
    Battery,
}

impl ChargeSource {
    pub fn label(self) -> &'static str {
        match self {
            ChargeSource::Usb => "USB",
            ChargeSource::Ac => "AC",
            ChargeSource::Wireless => "Wireless",
            ChargeSource::Battery => "Battery",
        }
    }
}

/// Raw battery readings. Units are the ones the service reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub level_percent: Option<i64>,
    pub state: ChargeState,
    /// Lower-case health word (`good`, `overheat`, `dead`, `cold`).
    pub health: Option<String>,
    pub technology: Option<String>,
    /// Tenths of a degree Celsius.
    pub temperature_tenths: Option<i64>,
    pub voltage_mv: Option<i64>,
    /// Instantaneous current in microamps, when the service exposes it.
    pub current_ua: Option<i64>,
    pub source: ChargeSource,
    pub cycle_count: Option<i64>,
    pub charge_time_remaining_ms: Option<i64>,
}

/// Addresses bound to one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddrs {
    pub name: String,
    pub addrs: Vec<IpAddr>,
}

/// Cellular data technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataNetwork {
    Gprs,
    Edge,
    Umts,
    Hspa,
    Lte,
    Hspap,
    Nr,
    Other,
}

impl DataNetwork {
    /// Telephony network type constant.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DataNetwork::Gprs,
            2 => DataNetwork::Edge,
            3 => DataNetwork::Umts,
            10 => DataNetwork::Hspa,
            13 => DataNetwork::Lte,
            15 => DataNetwork::Hspap,
            20 => DataNetwork::Nr,
            _ => DataNetwork::Other,
        }
    }

    /// Name as it appears in `gsm.network.type`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "GPRS" => DataNetwork::Gprs,
            "EDGE" => DataNetwork::Edge,
            "UMTS" => DataNetwork::Umts,
            "HSPA" => DataNetwork::Hspa,
            "LTE" | "LTE_CA" => DataNetwork::Lte,
            "HSPAP" | "HSPA+" => DataNetwork::Hspap,
            "NR" => DataNetwork::Nr,
            _ => DataNetwork::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DataNetwork::Nr => "5G",
            DataNetwork::Lte => "4G (LTE)",
            DataNetwork::Hspap | DataNetwork::Hspa | DataNetwork::Umts => "3G (HSPA/UMTS)",
            DataNetwork::Edge | DataNetwork::Gprs => "2G (EDGE/GPRS)",
            DataNetwork::Other => dt_common::sentinel::UNKNOWN,
        }
    }
}

/// Label for a Wi-Fi standard constant.
pub fn wifi_standard_label(code: i64) -> &'static str {
    match code {
        1 => "Legacy (802.11a/b/g)",
        4 => "Wi-Fi 4 (802.11n)",
        5 => "Wi-Fi 5 (802.11ac)",
        6 => "Wi-Fi 6 (802.11ax)",
        7 => "Wi-Fi (802.11ad)",
        8 => "Wi-Fi 7 (802.11be)",
        _ => dt_common::sentinel::UNKNOWN,
    }
}

/// Label for a thermal status level (0 none .. 6 shutdown).
pub fn thermal_status_label(level: Option<i64>) -> &'static str {
    match level {
        Some(0) => "Cool / Normal",
        Some(1) => "Light Throttling",
        Some(2) => "Moderate Throttling",
        Some(3) => "Severe Throttling",
        Some(4) => "Critical Throttling",
        Some(5) => "Emergency!",
        Some(6) => "Shutting Down",
        _ => dt_common::sentinel::UNKNOWN,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub operator: Option<String>,
    pub data_network: Option<DataNetwork>,
    /// Interface carrying the default route.
    pub active_interface: Option<String>,
    pub interfaces: Vec<InterfaceAddrs>,
    pub wifi_link_speed_mbps: Option<i64>,
    pub wifi_standard: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub width_px: Option<u32>,
    pub height_px: Option<u32>,
    pub density_dpi: Option<u32>,
    pub refresh_rate_hz: Option<f32>,
    pub hdr: Option<bool>,
    pub wide_color_gamut: Option<bool>,
    pub max_touch_points: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// `Legacy`, `Limited`, `Full` or `Level 3`.
    pub hardware_level: Option<String>,
    pub rear_megapixels: Option<f32>,
    pub front_megapixels: Option<f32>,
}

/// Declared system features plus a few counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub names: std::collections::BTreeSet<String>,
    /// Encoded `android.hardware.vulkan.version` feature version.
    pub vulkan_version: Option<u32>,
    pub sensor_count: Option<u32>,
    pub active_sim_count: Option<u32>,
}

pub mod feature {
    pub const NFC: &str = "android.hardware.nfc";
    pub const WIFI: &str = "android.hardware.wifi";
    pub const BLUETOOTH: &str = "android.hardware.bluetooth";
    pub const BLUETOOTH_LE: &str = "android.hardware.bluetooth_le";
    pub const UWB: &str = "android.hardware.uwb";
    pub const FINGERPRINT: &str = "android.hardware.fingerprint";
    pub const TELEPHONY: &str = "android.hardware.telephony";
    pub const EUICC: &str = "android.hardware.telephony.euicc";
    pub const CAMERA_CONCURRENT: &str = "android.hardware.camera.concurrent";
    pub const VULKAN_VERSION: &str = "android.hardware.vulkan.version";
    pub const TOUCHSCREEN: &str = "android.hardware.touchscreen";
    pub const MULTITOUCH: &str = "android.hardware.touchscreen.multitouch";
    pub const MULTITOUCH_DISTINCT: &str = "android.hardware.touchscreen.multitouch.distinct";
    pub const MULTITOUCH_JAZZHAND: &str = "android.hardware.touchscreen.multitouch.jazzhand";
}

impl FeatureSet {
    pub fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// `major.minor` of the Vulkan feature version.
    pub fn vulkan_label(&self) -> Option<String> {
        self.vulkan_version
            .map(|v| format!("{}.{}", v >> 22, (v >> 12) & 0x3FF))
    }

    pub fn multitouch_label(&self) -> &'static str {
        if self.has(feature::MULTITOUCH_JAZZHAND) {
            "Supported (5+ points)"
        } else if self.has(feature::MULTITOUCH_DISTINCT) {
            "Supported (2+ points)"
        } else if self.has(feature::MULTITOUCH) {
            "Supported (Basic)"
        } else if self.has(feature::TOUCHSCREEN) {
            "Single Touch Only"
        } else {
            dt_common::sentinel::NOT_SUPPORTED
        }
    }

    pub fn bluetooth_label(&self) -> &'static str {
        if !self.has(feature::BLUETOOTH) {
            dt_common::sentinel::NOT_SUPPORTED
        } else if self.has(feature::BLUETOOTH_LE) {
            "BLE / 4.0+"
        } else {
            "Classic"
        }
    }
}

/// Opaque platform fact sources.
pub trait PlatformSource: Send + Sync {
    fn memory(&self) -> Option<MemoryInfo>;
    fn storage(&self) -> Option<StorageInfo>;
    fn battery(&self) -> Option<BatteryReading>;
    fn network(&self) -> NetworkInfo;
    fn display(&self) -> DisplayInfo;
    fn camera(&self) -> CameraInfo;
    fn features(&self) -> FeatureSet;
    /// Thermal status level, 0 through 6.
    fn thermal_status(&self) -> Option<i64>;
    fn uptime_ms(&self) -> Option<u64>;
    /// Kernel release string.
    fn kernel_release(&self) -> Option<String>;
    fn timezone(&self) -> Option<String>;
    fn language(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_labels() {
        assert_eq!(DataNetwork::from_code(20).label(), "5G");
        assert_eq!(DataNetwork::from_code(13).label(), "4G (LTE)");
        assert_eq!(DataNetwork::from_code(15).label(), "3G (HSPA/UMTS)");
        assert_eq!(DataNetwork::from_code(3).label(), "3G (HSPA/UMTS)");
        assert_eq!(DataNetwork::from_code(2).label(), "2G (EDGE/GPRS)");
        assert_eq!(DataNetwork::from_code(0).label(), "Unknown");
        assert_eq!(DataNetwork::from_name("lte"), DataNetwork::Lte);
        assert_eq!(DataNetwork::from_name("NR"), DataNetwork::Nr);
    }

    #[test]
    fn wifi_and_thermal_labels() {
        assert_eq!(wifi_standard_label(6), "Wi-Fi 6 (802.11ax)");
        assert_eq!(wifi_standard_label(2), "Unknown");
        assert_eq!(thermal_status_label(Some(0)), "Cool / Normal");
        assert_eq!(thermal_status_label(Some(5)), "Emergency!");
        assert_eq!(thermal_status_label(None), "Unknown");
    }

    #[test]
    fn charge_state_from_sysfs() {
        assert_eq!(ChargeState::from_sysfs("Charging\n"), ChargeState::Charging);
        assert_eq!(ChargeState::from_sysfs("Not charging"), ChargeState::NotCharging);
        assert_eq!(ChargeState::from_sysfs("???"), ChargeState::Unknown);
    }

    #[test]
    fn vulkan_and_bluetooth_labels() {
        let mut features = FeatureSet::default();
        assert_eq!(features.bluetooth_label(), "Not Supported");
        features.names.insert(feature::BLUETOOTH.to_string());
        assert_eq!(features.bluetooth_label(), "Classic");
        features.names.insert(feature::BLUETOOTH_LE.to_string());
        assert_eq!(features.bluetooth_label(), "BLE / 4.0+");

        assert_eq!(features.multitouch_label(), "Not Supported");
        features.names.insert(feature::TOUCHSCREEN.to_string());
        features.names.insert(feature::MULTITOUCH_DISTINCT.to_string());
        assert_eq!(features.multitouch_label(), "Supported (2+ points)");

        // 1.3.0
        features.vulkan_version = Some((1 << 22) | (3 << 12));
        assert_eq!(features.vulkan_label().as_deref(), Some("1.3"));
    }
}
