//! Category views over a static and a dynamic snapshot.
//!
//! Presentation layers show facts grouped into seven fixed categories of
//! `(label, value)` rows. The grouping and value formatting live here so
//! every consumer renders the same text.

use serde::Serialize;

use dt_common::sentinel::{NONE, NOT_SUPPORTED, UNKNOWN};

use super::partition::Detection;
use super::{DynamicSnapshot, StaticSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Identity,
    System,
    CpuGpu,
    Memory,
    Battery,
    DisplayCamera,
    Connectivity,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Identity,
        Category::System,
        Category::CpuGpu,
        Category::Memory,
        Category::Battery,
        Category::DisplayCamera,
        Category::Connectivity,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Identity => "Device Identity",
            Category::System => "System & Partitions",
            Category::CpuGpu => "CPU & GPU",
            Category::Memory => "Memory",
            Category::Battery => "Battery",
            Category::DisplayCamera => "Display & Camera",
            Category::Connectivity => "Connectivity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    pub category: Category,
    pub title: &'static str,
    pub rows: Vec<Row>,
}

/// `HH hrs MM mins SS secs`; hours are not wrapped.
pub fn format_uptime(ms: u64) -> String {
    let secs = ms / 1000;
    format!(
        "{:02} hrs {:02} mins {:02} secs",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}

pub fn format_power(watts: f64, charging: bool) -> String {
    if charging && watts > 0.0 {
        format!("{watts:.2} W")
    } else {
        "Not Charging".to_string()
    }
}

pub fn format_cycles(cycles: Option<i64>) -> String {
    cycles
        .map(|c| c.to_string())
        .unwrap_or_else(|| "Unknown / Not Supported".to_string())
}

/// `Hh Mm` above an hour, `N mins` otherwise.
pub fn format_time_to_full(ms: Option<i64>) -> String {
    match ms.filter(|ms| *ms > 0) {
        Some(ms) => {
            let mins = ms / 60_000;
            if mins > 60 {
                format!("{}h {}m", mins / 60, mins % 60)
            } else {
                format!("{mins} mins")
            }
        }
        None => UNKNOWN.to_string(),
    }
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn either(flag: bool, yes: &str, no: &str) -> String {
    if flag { yes } else { no }.to_string()
}

fn opt<T: ToString>(value: Option<T>, suffix: &str) -> String {
    value
        .map(|v| format!("{}{suffix}", v.to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn detected(d: &Detection, yes: &str, no: &str) -> String {
    either(d.present, yes, no)
}

fn row(label: &'static str, value: impl Into<String>) -> Row {
    Row {
        label,
        value: value.into(),
    }
}

impl CategoryView {
    /// All seven categories in display order.
    pub fn render(s: &StaticSnapshot, d: &DynamicSnapshot) -> Vec<CategoryView> {
        Category::ALL
            .into_iter()
            .map(|category| CategoryView {
                category,
                title: category.title(),
                rows: rows_for(category, s, d),
            })
            .collect()
    }
}

fn rows_for(category: Category, s: &StaticSnapshot, d: &DynamicSnapshot) -> Vec<Row> {
    match category {
        Category::Identity => {
            let id = &s.identity;
            vec![
                row("Device Name", id.device_name.clone()),
                row("Model", id.model.clone()),
                row("Manufacturer", id.manufacturer.clone()),
                row("Brand", id.brand.clone()),
                row("Codename", id.codename.clone()),
                row("Android Version", id.android_version.clone()),
                row("API Level", opt(id.api_level, "")),
                row("UI Version", id.ui_rom.clone()),
                row("Security Patch", id.security_patch.clone()),
                row("Build ID", id.build_id.clone()),
                row("Build Type", id.build_type.clone()),
                row("Build Fingerprint", id.fingerprint.clone()),
            ]
        }
        Category::System => {
            let p = &s.system.partitions;
            let dynamic_partitions = if p.retrofit_dynamic_partitions {
                "Yes (Retrofit)"
            } else if p.dynamic_partitions.present {
                "Yes (Native)"
            } else {
                "No (Legacy Only)"
            };
            vec![
                row("Supported ABIs", s.hardware.abis.join(", ")),
                row("Kernel Version", s.system.kernel_version.clone()),
                row("Generic Kernel (GKI)", detected(&p.gki, "Yes (Official)", "No (Custom/Legacy)")),
                row("Generic System (GSI)", detected(&p.gsi, "Yes (GSI/AOSP)", "No (Stock/OEM)")),
                row("Project Treble", either(p.treble, "Supported", NOT_SUPPORTED)),
                row("System-As-Root (SAR)", yes_no(p.system_as_root.present)),
                row("Dynamic Partitions", dynamic_partitions),
                row("Seamless Updates (A/B)", detected(&p.seamless_update, "Supported", NOT_SUPPORTED)),
                row("Virtual A/B Status", p.virtual_ab_status.label()),
                row("Root Access", either(s.root.is_rooted, "Granted", NONE)),
                row("Root Manager", s.root.manager_name.clone()),
                row("Vendor", s.drm.vendor.clone()),
                row("Version", s.drm.version.clone()),
                row("Description", s.drm.description.clone()),
                row("Algorithms", s.drm.algorithms.clone()),
                row("Widevine DRM Level", s.drm.security_level.clone()),
                row("Max HDCP Level", s.drm.max_hdcp_level.clone()),
                row("Language", s.locale.language.clone()),
                row("Timezone", s.locale.timezone.clone()),
            ]
        }
        Category::CpuGpu => {
            let hw = &s.hardware;
            let max_freqs = hw
                .max_freq_mhz
                .iter()
                .map(|f| format!("{f} MHz"))
                .collect::<Vec<_>>()
                .join(", ");
            let cur_freqs = d
                .cpu
                .cur_freq_mhz
                .iter()
                .map(|f| format!("{f} MHz"))
                .collect::<Vec<_>>()
                .join(", ");
            let or_unknown = |s: String| if s.is_empty() { UNKNOWN.to_string() } else { s };
            vec![
                row("SoC Manufacturer", hw.soc_manufacturer.clone()),
                row("SoC Model", hw.soc_model.clone()),
                row("Hardware SKU", hw.hardware_sku.clone()),
                row("ODM SKU", hw.odm_sku.clone()),
                row("Board", hw.board.clone()),
                row("Hardware", hw.hardware.clone()),
                row("CPU Architecture", hw.primary_abi.clone()),
                row("CPU Cores", hw.core_count.to_string()),
                row("Max Frequencies", or_unknown(max_freqs)),
                row("Current Frequencies", or_unknown(cur_freqs)),
                row("CPU Governor", d.cpu.governor.clone()),
                row("CPU Temperature", opt(d.cpu.temperature_c, "°C")),
                row("Thermal Status", d.cpu.thermal_status.clone()),
                row("EGL Driver", hw.egl_driver.clone()),
                row("OpenGL Version", hw.opengl_es.clone()),
                row("Vulkan Version", hw.vulkan.clone()),
            ]
        }
        Category::Memory => vec![
            row("RAM Total", opt(s.memory.ram_total_mb, " MB")),
            row("RAM Used", opt(d.memory.ram_used_mb, " MB")),
            row("RAM Free", opt(d.memory.ram_free_mb, " MB")),
            row("Java Heap Size (Dalvik)", opt(s.memory.dalvik_heap_mb, " MB")),
            row("Low RAM Device", yes_no(s.memory.low_ram)),
            row("Internal Storage Total", opt(s.memory.internal_total_gb, " GB")),
            row("Internal Storage Free", opt(d.memory.internal_free_gb, " GB")),
        ],
        Category::Battery => {
            let b = &d.battery;
            vec![
                row("Battery Level", opt(b.level_percent, "%")),
                row("Battery Health", b.health.clone()),
                row("Battery Status", b.status.clone()),
                row("Technology", b.technology.clone()),
                row("Power Source", b.charging_source.clone()),
                row("Fast Charging", yes_no(b.is_fast_charging)),
                row("Time to Full", format_time_to_full(b.charge_time_remaining_ms)),
                row("Battery Voltage", opt(b.voltage_mv, " mV")),
                row("Battery Current", format!("{} mA", b.current_ma)),
                row("Charging Power", format_power(b.power_watts, b.is_charging)),
                row("Battery Temperature", opt(b.temperature_c, "°C")),
                row("Battery Cycles", format_cycles(b.cycle_count)),
                row(
                    "System Uptime",
                    d.uptime_ms
                        .map(format_uptime)
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                ),
            ]
        }
        Category::DisplayCamera => {
            let disp = &s.display;
            vec![
                row("Resolution", disp.resolution.clone()),
                row("Refresh Rate", opt(d.display_refresh_hz, " Hz")),
                row("Pixel Density", opt(disp.density_dpi, " DPI")),
                row("HDR Support", opt(disp.hdr.map(|h| if h { "Yes" } else { "No" }), "")),
                row(
                    "Wide Color Gamut",
                    opt(disp.wide_color_gamut.map(|w| if w { "Supported" } else { "Standard" }), ""),
                ),
                row("Multitouch", disp.multitouch.clone()),
                row("Rear Camera", disp.rear_camera.clone()),
                row("Front Camera", disp.front_camera.clone()),
                row("Camera Hardware Level", disp.camera_level.clone()),
                row("Concurrent Cameras", either(s.features.concurrent_camera, "Supported", NOT_SUPPORTED)),
            ]
        }
        Category::Connectivity => {
            let f = &s.features;
            let c = &d.connectivity;
            vec![
                row("SIM Supported", yes_no(f.sim_supported)),
                row("Active SIM Slots", opt(f.active_sim_count, "")),
                row("eSIM Support", yes_no(f.esim)),
                row("Network Operator", c.operator.clone()),
                row("Data Network Type", c.network_type.clone()),
                row("IPv4 Address", c.ipv4.clone()),
                row("IPv6 Address", c.ipv6.clone()),
                row("Wi-Fi Supported", yes_no(f.wifi)),
                row("Wi-Fi Standard", c.wifi_standard.clone().unwrap_or_else(|| UNKNOWN.to_string())),
                row("Wi-Fi Link Speed", opt(c.wifi_link_speed_mbps, " Mbps")),
                row("Bluetooth", f.bluetooth.clone()),
                row("NFC Supported", yes_no(f.nfc)),
                row("Ultra-Wideband (UWB)", yes_no(f.uwb)),
                row("Total Sensors", opt(f.sensor_count, "")),
                row("Fingerprint Sensor", either(f.fingerprint, "Present", "Absent")),
            ]
        }
    }
}
