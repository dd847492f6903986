//! The once-per-session device snapshot.

use serde::Serialize;
use tracing::debug;

use dt_common::sentinel::{or_unknown, UNKNOWN};
use dt_common::SchemaStamp;

use super::cpu;
use super::partition::{PartitionLayout, SignalEnv};
use super::Sources;
use crate::logging::event_names;
use crate::platform::{feature, DrmInfo};
use crate::probe::{probe, FactCategory, ProbeState};
use crate::props::PropertyStore;
use crate::root::RootIdentity;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

pub const KERNEL_NODES: &[&str] = &["/proc/sys/kernel/osrelease"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub device_name: String,
    pub model: String,
    pub manufacturer: String,
    pub brand: String,
    pub codename: String,
    pub android_version: String,
    pub api_level: Option<i64>,
    pub security_patch: String,
    pub fingerprint: String,
    pub build_id: String,
    pub build_type: String,
    /// Vendor UI family, e.g. `HyperOS OS2.0.5`.
    pub ui_rom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hardware {
    pub soc_manufacturer: String,
    pub soc_model: String,
    pub hardware_sku: String,
    pub odm_sku: String,
    pub board: String,
    pub hardware: String,
    pub primary_abi: String,
    pub abis: Vec<String>,
    pub core_count: usize,
    /// Per-core maximum frequency, MHz.
    pub max_freq_mhz: Vec<u32>,
    pub egl_driver: String,
    pub opengl_es: String,
    pub vulkan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStatic {
    pub ram_total_mb: Option<u64>,
    pub low_ram: bool,
    pub dalvik_heap_mb: Option<u64>,
    pub internal_total_gb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub kernel_version: String,
    pub partitions: PartitionLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    pub nfc: bool,
    pub wifi: bool,
    pub bluetooth: String,
    pub uwb: bool,
    pub fingerprint: bool,
    pub esim: bool,
    pub sim_supported: bool,
    pub active_sim_count: Option<u32>,
    pub sensor_count: Option<u32>,
    pub concurrent_camera: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayCamera {
    pub resolution: String,
    pub density_dpi: Option<u32>,
    pub hdr: Option<bool>,
    pub wide_color_gamut: Option<bool>,
    pub multitouch: String,
    pub camera_level: String,
    pub rear_camera: String,
    pub front_camera: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locale {
    pub timezone: String,
    pub language: String,
}

/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticSnapshot {
    #[serde(flatten)]
    pub stamp: SchemaStamp,
    pub identity: Identity,
    pub hardware: Hardware,
    pub memory: MemoryStatic,
    pub system: SystemInfo,
    pub root: RootIdentity,
    pub drm: DrmInfo,
    pub features: FeatureFlags,
    pub display: DisplayCamera,
    pub locale: Locale,
}

fn prop(props: &dyn PropertyStore, key: &str) -> String {
    props.get(key, UNKNOWN)
}

/// Vendor UI family from vendor version properties.
pub fn ui_rom_name(props: &dyn PropertyStore) -> String {
    let named = |key: &str, label: &str| props.get_opt(key).map(|v| format!("{label} {v}"));
    named("ro.miui.version.name_raw", "HyperOS")
        .or_else(|| named("ro.miui.ui.version.name", "MIUI"))
        .or_else(|| {
            props
                .get_opt("ro.build.version.oneui")
                .map(|_| "OneUI (Samsung)".to_string())
        })
        .or_else(|| named("ro.build.version.oplusrom", "ColorOS"))
        .or_else(|| named("ro.oxygen.version", "OxygenOS"))
        .or_else(|| named("ro.vivo.os.version", "Funtouch OS"))
        .unwrap_or_else(|| "AOSP / Stock".to_string())
}

/// `ro.opengles.version` packs major in the high 16 bits.
pub fn decode_gles_version(raw: i64) -> Option<String> {
    (raw > 0).then(|| format!("{}.{}", raw >> 16, raw & 0xFFFF))
}

/// `256m` / `512M` / `1g` heap sizes in MB.
pub fn parse_heap_size_mb(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit())?);
    let n: u64 = digits.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "m" => Some(n),
        "g" => Some(n * 1024),
        "k" => Some(n / 1024),
        _ => None,
    }
}

fn megapixels(mp: Option<f32>) -> String {
    mp.map(|v| format!("{} MP", v.round() as i64))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

impl StaticSnapshot {
    /// Resolve every static fact once.
    pub fn build(sources: &Sources<'_>, root: &RootIdentity, state: &mut ProbeState) -> Self {
        let props = sources.props;
        let platform = sources.platform;

        let api_level = props.get_int("ro.build.version.sdk");
        let model = prop(props, "ro.product.model");
        let identity = Identity {
            device_name: props
                .get_opt("ro.product.marketname")
                .unwrap_or_else(|| model.clone()),
            model,
            manufacturer: prop(props, "ro.product.manufacturer"),
            brand: prop(props, "ro.product.brand"),
            codename: prop(props, "ro.product.device"),
            android_version: prop(props, "ro.build.version.release"),
            api_level,
            security_patch: prop(props, "ro.build.version.security_patch"),
            fingerprint: prop(props, "ro.build.fingerprint"),
            build_id: prop(props, "ro.build.id"),
            build_type: prop(props, "ro.build.type"),
            ui_rom: ui_rom_name(props),
        };

        let features = platform.features();
        let abis: Vec<String> = props
            .get_opt("ro.product.cpu.abilist")
            .map(|list| list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let core_count = cpu::core_count(sources.fs);
        let hardware = Hardware {
            soc_manufacturer: prop(props, "ro.soc.manufacturer"),
            soc_model: prop(props, "ro.soc.model"),
            hardware_sku: prop(props, "ro.boot.hardware.sku"),
            odm_sku: prop(props, "ro.boot.product.hardware.sku"),
            board: prop(props, "ro.product.board"),
            hardware: prop(props, "ro.hardware"),
            primary_abi: abis
                .first()
                .cloned()
                .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
            abis,
            core_count,
            max_freq_mhz: cpu::max_frequencies(
                state,
                sources.fs,
                sources.shell,
                root.is_rooted,
                core_count,
            ),
            egl_driver: prop(props, "ro.hardware.egl"),
            opengl_es: props
                .get_int("ro.opengles.version")
                .and_then(decode_gles_version)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            vulkan: features
                .vulkan_label()
                .unwrap_or_else(|| dt_common::sentinel::NOT_SUPPORTED.to_string()),
        };

        let mem = platform.memory();
        let storage = platform.storage();
        let memory = MemoryStatic {
            ram_total_mb: mem.map(|m| m.total_bytes / MIB),
            low_ram: props.get_bool("ro.config.low_ram"),
            dalvik_heap_mb: props
                .get_opt("dalvik.vm.heapgrowthlimit")
                .and_then(|v| parse_heap_size_mb(&v)),
            internal_total_gb: storage.map(|s| s.total_bytes / GIB),
        };

        let kernel_version = platform
            .kernel_release()
            .or_else(|| {
                probe(state, sources.fs, FactCategory::KernelVersion, KERNEL_NODES).map(|r| r.value)
            })
            .unwrap_or_else(|| UNKNOWN.to_string());
        let kernel_lower = kernel_version.to_lowercase();
        let env = SignalEnv::new(props, sources.fs, &kernel_lower, api_level);
        let system = SystemInfo {
            partitions: PartitionLayout::detect(&env),
            kernel_version,
        };

        let flags = FeatureFlags {
            nfc: features.has(feature::NFC),
            wifi: features.has(feature::WIFI),
            bluetooth: features.bluetooth_label().to_string(),
            uwb: features.has(feature::UWB),
            fingerprint: features.has(feature::FINGERPRINT),
            esim: features.has(feature::EUICC),
            sim_supported: features.has(feature::TELEPHONY),
            active_sim_count: features.active_sim_count,
            sensor_count: features.sensor_count,
            concurrent_camera: features.has(feature::CAMERA_CONCURRENT),
        };

        let display_info = platform.display();
        let camera = platform.camera();
        let display = DisplayCamera {
            resolution: match (display_info.width_px, display_info.height_px) {
                (Some(w), Some(h)) => format!("{w}x{h}"),
                _ => UNKNOWN.to_string(),
            },
            density_dpi: display_info.density_dpi,
            hdr: display_info.hdr,
            wide_color_gamut: display_info.wide_color_gamut,
            multitouch: features.multitouch_label().to_string(),
            camera_level: or_unknown(camera.hardware_level.unwrap_or_default()),
            rear_camera: megapixels(camera.rear_megapixels),
            front_camera: megapixels(camera.front_megapixels),
        };

        let locale = Locale {
            timezone: or_unknown(platform.timezone().unwrap_or_default()),
            language: or_unknown(platform.language().unwrap_or_default()),
        };

        let snapshot = Self {
            stamp: SchemaStamp::now(),
            identity,
            hardware,
            memory,
            system,
            root: root.clone(),
            drm: DrmInfo::query(sources.drm),
            features: flags,
            display,
            locale,
        };
        debug!(
            target: event_names::SNAPSHOT_BUILT,
            kind = "static",
            denied = state.denied_count(),
            "static snapshot built"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemoryInfo, UnavailableDrm};
    use crate::props::MapPropertyStore;
    use crate::test_utils::{FakeDrm, FakePlatform, MemoryFs, ScriptedShell};

    #[test]
    fn ui_rom_precedence() {
        let props = MapPropertyStore::new();
        assert_eq!(ui_rom_name(&props), "AOSP / Stock");
        let props = MapPropertyStore::new()
            .with("ro.miui.ui.version.name", "V14")
            .with("ro.miui.version.name_raw", "OS1.0.3");
        assert_eq!(ui_rom_name(&props), "HyperOS OS1.0.3");
        let props = MapPropertyStore::new().with("ro.build.version.oneui", "60000");
        assert_eq!(ui_rom_name(&props), "OneUI (Samsung)");
        let props = MapPropertyStore::new().with("ro.vivo.os.version", "13");
        assert_eq!(ui_rom_name(&props), "Funtouch OS 13");
    }

    #[test]
    fn gles_and_heap_decoding() {
        assert_eq!(decode_gles_version(196610).as_deref(), Some("3.2"));
        assert_eq!(decode_gles_version(0), None);
        assert_eq!(parse_heap_size_mb("256m"), Some(256));
        assert_eq!(parse_heap_size_mb("1g"), Some(1024));
        assert_eq!(parse_heap_size_mb("512"), None);
    }

    #[test]
    fn builds_from_fakes() {
        let props = MapPropertyStore::new()
            .with("ro.product.model", "2201116SG")
            .with("ro.product.marketname", "Redmi Note 11 Pro+ 5G")
            .with("ro.build.version.sdk", "33")
            .with("ro.product.cpu.abilist", "arm64-v8a,armeabi-v7a,armeabi")
            .with("ro.boot.dynamic_partitions", "true")
            .with("ro.virtual_ab.enabled", "true")
            .with("ro.opengles.version", "196610");
        let fs = MemoryFs::new()
            .with_file("/sys/devices/system/cpu/possible", "0-1")
            .with_file("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq", "2000000")
            .with_file("/sys/devices/system/cpu/cpu1/cpufreq/cpuinfo_max_freq", "2850000")
            .with_file("/proc/sys/kernel/osrelease", "5.10.149-android12-9-00001-gki\n");
        let platform = FakePlatform {
            memory: Some(MemoryInfo {
                total_bytes: 8 * 1024 * MIB,
                available_bytes: 3 * 1024 * MIB,
            }),
            ..FakePlatform::default()
        };
        let shell = ScriptedShell::new();
        let drm = FakeDrm::widevine().with("securityLevel", "L1");
        let sources = Sources {
            fs: &fs,
            shell: &shell,
            props: &props,
            platform: &platform,
            drm: &drm,
        };
        let mut state = ProbeState::new();
        let snap = StaticSnapshot::build(&sources, &RootIdentity::unrooted(), &mut state);

        assert_eq!(snap.identity.device_name, "Redmi Note 11 Pro+ 5G");
        assert_eq!(snap.identity.api_level, Some(33));
        assert_eq!(snap.hardware.primary_abi, "arm64-v8a");
        assert_eq!(snap.hardware.max_freq_mhz, vec![2000, 2850]);
        assert_eq!(snap.hardware.opengl_es, "3.2");
        assert_eq!(snap.memory.ram_total_mb, Some(8192));
        assert!(snap.system.partitions.dynamic_partitions.present);
        assert!(snap.system.partitions.gki.present);
        assert!(snap.system.partitions.system_as_root.present);
        assert_eq!(snap.system.partitions.virtual_ab_status.label(), "VAB (Standard)");
        assert_eq!(snap.drm.security_level, "L1");
        assert_eq!(snap.display.resolution, UNKNOWN);
        assert_eq!(state.denied_count(), 0);
    }

    #[test]
    fn empty_device_degrades_to_sentinels() {
        let props = MapPropertyStore::new();
        let fs = MemoryFs::new();
        let platform = FakePlatform::default();
        let shell = ScriptedShell::new();
        let sources = Sources {
            fs: &fs,
            shell: &shell,
            props: &props,
            platform: &platform,
            drm: &UnavailableDrm,
        };
        let mut state = ProbeState::new();
        let snap = StaticSnapshot::build(&sources, &RootIdentity::unrooted(), &mut state);
        assert_eq!(snap.identity.model, UNKNOWN);
        assert_eq!(snap.system.kernel_version, UNKNOWN);
        assert_eq!(snap.drm, DrmInfo::not_supported());
        assert!(!snap.system.partitions.gsi.present);
        assert!(state.is_denied(FactCategory::KernelVersion));
        assert!(state.is_denied(FactCategory::CpuMaxFreq));
    }
}
