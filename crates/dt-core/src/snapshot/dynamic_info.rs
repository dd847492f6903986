//! The per-tick device snapshot.
//!
//! Rebuilt on every poll. Only the [`ProbeState`] carries anything from one
//! tick to the next.

use std::net::IpAddr;

use serde::Serialize;
use tracing::trace;

use dt_common::sentinel::{NOT_CONNECTED, UNKNOWN};
use dt_common::SchemaStamp;

use super::cpu;
use super::Sources;
use crate::logging::event_names;
use crate::platform::{thermal_status_label, wifi_standard_label, ChargeState, NetworkInfo};
use crate::probe::{probe, FactCategory, ProbeState};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Readings above this magnitude are microamps.
pub const MICROAMP_THRESHOLD: i64 = 10_000;

/// Charging power at or above this is fast charging.
pub const FAST_CHARGE_WATTS: f64 = 10.0;

pub const MAX_VALID_CYCLES: i64 = 10_000;

pub const CURRENT_NODES: &[&str] = &[
    "/sys/class/power_supply/battery/current_now",
    "/sys/class/power_supply/bms/current_now",
    "/sys/class/power_supply/main/current_now",
    "/sys/class/power_supply/battery/batt_current",
    "/sys/class/power_supply/battery/batt_current_now",
    "/sys/devices/platform/battery/power_supply/battery/current_now",
];

pub const CYCLE_NODES: &[&str] = &[
    "/sys/class/power_supply/battery/cycle_count",
    "/sys/class/power_supply/bms/charge_full",
];

/// Raw vendor current reading to milliamps.
///
/// Magnitudes above 10000 are taken as microamps. Exactly 10000 stays
/// milliamps. The sign is dropped.
pub fn normalize_current_ma(raw: i64) -> i64 {
    let magnitude = raw.saturating_abs();
    if magnitude > MICROAMP_THRESHOLD {
        magnitude / 1000
    } else {
        magnitude
    }
}

/// Charging power in watts, two decimals. Zero unless charging.
pub fn compute_power_watts(current_ma: i64, voltage_mv: i64, charging: bool) -> f64 {
    if !charging {
        return 0.0;
    }
    let amps = current_ma.saturating_abs() as f64 / 1000.0;
    let volts = voltage_mv.saturating_abs() as f64 / 1000.0;
    (amps * volts * 100.0).round() / 100.0
}

pub fn is_fast_charging(power_watts: f64) -> bool {
    power_watts >= FAST_CHARGE_WATTS
}

/// Cycle counts outside 1..=10000 are vendor garbage.
pub fn valid_cycle_count(raw: i64) -> Option<i64> {
    (1..=MAX_VALID_CYCLES).contains(&raw).then_some(raw)
}

fn status_label(state: ChargeState, current_ma: i64) -> &'static str {
    match state {
        ChargeState::Full => "full",
        ChargeState::Charging => "charging",
        ChargeState::Discharging => "discharging",
        _ if current_ma > 0 => "discharging",
        _ => "not charging",
    }
}

/// Drop an IPv6 zone suffix (`fe80::1%wlan0`).
pub fn strip_scope(addr: &str) -> &str {
    addr.split('%').next().unwrap_or(addr)
}

/// First non-loopback IPv4 and IPv6 of the active link.
pub fn select_addresses(network: &NetworkInfo) -> (String, String) {
    let active = network
        .active_interface
        .as_deref()
        .and_then(|name| network.interfaces.iter().find(|i| i.name == name));

    let Some(link) = active else {
        return (NOT_CONNECTED.to_string(), NOT_CONNECTED.to_string());
    };

    let usable = || link.addrs.iter().filter(|a| !a.is_loopback());
    let ipv4 = usable()
        .find(|a| matches!(a, IpAddr::V4(_)))
        .map(|a| a.to_string())
        .unwrap_or_else(|| NOT_CONNECTED.to_string());
    let ipv6 = usable()
        .find(|a| matches!(a, IpAddr::V6(_)))
        .map(|a| strip_scope(&a.to_string()).to_string())
        .unwrap_or_else(|| NOT_CONNECTED.to_string());
    (ipv4, ipv6)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryDynamic {
    pub ram_used_mb: Option<u64>,
    pub ram_free_mb: Option<u64>,
    pub internal_free_gb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryState {
    pub level_percent: Option<i64>,
    pub status: String,
    pub health: String,
    pub technology: String,
    pub temperature_c: Option<f64>,
    pub voltage_mv: Option<i64>,
    pub current_ma: i64,
    pub power_watts: f64,
    pub charging_source: String,
    pub is_charging: bool,
    pub is_fast_charging: bool,
    pub cycle_count: Option<i64>,
    pub charge_time_remaining_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    pub operator: String,
    pub network_type: String,
    pub ipv4: String,
    pub ipv6: String,
    pub wifi_link_speed_mbps: Option<i64>,
    pub wifi_standard: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuState {
    pub cur_freq_mhz: Vec<u32>,
    pub governor: String,
    pub temperature_c: Option<f64>,
    pub thermal_status: String,
}

/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicSnapshot {
    #[serde(flatten)]
    pub stamp: SchemaStamp,
    pub memory: MemoryDynamic,
    pub battery: BatteryState,
    pub connectivity: Connectivity,
    pub cpu: CpuState,
    pub display_refresh_hz: Option<u32>,
    pub uptime_ms: Option<u64>,
}

fn battery_current_ma(
    sources: &Sources<'_>,
    state: &mut ProbeState,
    platform_ua: Option<i64>,
) -> i64 {
    if let Some(ua) = platform_ua.filter(|ua| *ua != 0) {
        return ua.saturating_abs() / 1000;
    }
    probe(state, sources.fs, FactCategory::BatteryCurrent, CURRENT_NODES)
        .and_then(|r| r.value.parse::<i64>().ok())
        .map(normalize_current_ma)
        .unwrap_or(0)
}

fn battery_cycles(sources: &Sources<'_>, state: &mut ProbeState, platform: Option<i64>) -> Option<i64> {
    if let Some(cycles) = platform.filter(|c| *c > 0) {
        return Some(cycles);
    }
    probe(state, sources.fs, FactCategory::BatteryCycles, CYCLE_NODES)
        .and_then(|r| r.value.parse::<i64>().ok())
        .and_then(valid_cycle_count)
}

impl DynamicSnapshot {
    /// Resolve one tick's worth of facts.
    pub fn build(sources: &Sources<'_>, cores: usize, state: &mut ProbeState) -> Self {
        let platform = sources.platform;

        let memory = {
            let mem = platform.memory();
            MemoryDynamic {
                ram_used_mb: mem.map(|m| m.total_bytes.saturating_sub(m.available_bytes) / MIB),
                ram_free_mb: mem.map(|m| m.available_bytes / MIB),
                internal_free_gb: platform.storage().map(|s| s.free_bytes / GIB),
            }
        };

        let reading = platform.battery().unwrap_or_default();
        let current_ma = battery_current_ma(sources, state, reading.current_ua);
        let is_charging = matches!(reading.state, ChargeState::Charging | ChargeState::Full);
        let voltage = reading.voltage_mv.unwrap_or(0);
        let power_watts = compute_power_watts(current_ma, voltage, is_charging);
        let battery = BatteryState {
            level_percent: reading.level_percent,
            status: status_label(reading.state, current_ma).to_string(),
            health: reading.health.clone().unwrap_or_else(|| "unknown".to_string()),
            technology: reading
                .technology
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            temperature_c: reading.temperature_tenths.map(|t| t as f64 / 10.0),
            voltage_mv: reading.voltage_mv,
            current_ma,
            power_watts,
            charging_source: reading.source.label().to_string(),
            is_charging,
            is_fast_charging: is_fast_charging(power_watts),
            cycle_count: battery_cycles(sources, state, reading.cycle_count),
            charge_time_remaining_ms: reading.charge_time_remaining_ms.filter(|ms| *ms >= 0),
        };

        let network = platform.network();
        let (ipv4, ipv6) = select_addresses(&network);
        let connectivity = Connectivity {
            operator: network
                .operator
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            network_type: network
                .data_network
                .map(|n| n.label())
                .unwrap_or(UNKNOWN)
                .to_string(),
            ipv4,
            ipv6,
            wifi_link_speed_mbps: network.wifi_link_speed_mbps.filter(|s| *s > 0),
            wifi_standard: network.wifi_standard.map(|c| wifi_standard_label(c).to_string()),
        };

        let cpu = CpuState {
            cur_freq_mhz: cpu::current_frequencies(state, sources.fs, cores),
            governor: cpu::governor(state, sources.fs).unwrap_or_else(|| UNKNOWN.to_string()),
            temperature_c: cpu::temperature(state, sources.fs),
            thermal_status: thermal_status_label(platform.thermal_status()).to_string(),
        };

        let snapshot = Self {
            stamp: SchemaStamp::now(),
            memory,
            battery,
            connectivity,
            cpu,
            display_refresh_hz: platform
                .display()
                .refresh_rate_hz
                .map(|hz| hz.round() as u32),
            uptime_ms: platform.uptime_ms(),
        };
        trace!(
            target: event_names::SNAPSHOT_BUILT,
            kind = "dynamic",
            denied = state.denied_count(),
            "dynamic snapshot built"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;
    use crate::platform::{BatteryReading, InterfaceAddrs, UnavailableDrm};
    use crate::props::MapPropertyStore;
    use crate::test_utils::{FakePlatform, MemoryFs, ScriptedShell};
    use proptest::prelude::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn power_at_half_amp_four_volts() {
        assert_approx_eq!(compute_power_watts(500, 4000, true), 2.0);
        assert_eq!(compute_power_watts(500, 4000, false), 0.0);
    }

    #[test]
    fn power_rounds_to_two_decimals() {
        assert_approx_eq!(compute_power_watts(1234, 3876, true), 4.78);
        assert_approx_eq!(compute_power_watts(-2500, 4400, true), 11.0);
    }

    #[test]
    fn current_normalization_boundary() {
        assert_eq!(normalize_current_ma(500_000), 500);
        assert_eq!(normalize_current_ma(500), 500);
        assert_eq!(normalize_current_ma(-500_000), 500);
        assert_eq!(normalize_current_ma(10_000), 10_000);
        assert_eq!(normalize_current_ma(10_001), 10);
        assert_eq!(normalize_current_ma(-10_000), 10_000);
    }

    #[test]
    fn cycle_range() {
        assert_eq!(valid_cycle_count(0), None);
        assert_eq!(valid_cycle_count(1), Some(1));
        assert_eq!(valid_cycle_count(10_000), Some(10_000));
        assert_eq!(valid_cycle_count(4_200_000), None);
    }

    #[test]
    fn addresses_come_from_the_active_link() {
        let network = NetworkInfo {
            active_interface: Some("wlan0".to_string()),
            interfaces: vec![
                InterfaceAddrs {
                    name: "lo".to_string(),
                    addrs: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
                },
                InterfaceAddrs {
                    name: "rmnet_data0".to_string(),
                    addrs: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))],
                },
                InterfaceAddrs {
                    name: "wlan0".to_string(),
                    addrs: vec![
                        IpAddr::V6(Ipv6Addr::LOCALHOST),
                        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 23)),
                        IpAddr::V6("fe80::1".parse().unwrap()),
                        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 24)),
                    ],
                },
            ],
            ..NetworkInfo::default()
        };
        let (v4, v6) = select_addresses(&network);
        assert_eq!(v4, "192.168.1.23");
        assert_eq!(v6, "fe80::1");

        let (v4, v6) = select_addresses(&NetworkInfo::default());
        assert_eq!((v4.as_str(), v6.as_str()), (NOT_CONNECTED, NOT_CONNECTED));
        assert_eq!(strip_scope("fe80::1%wlan0"), "fe80::1");
    }

    fn sources<'a>(
        fs: &'a MemoryFs,
        shell: &'a ScriptedShell,
        props: &'a MapPropertyStore,
        platform: &'a FakePlatform,
    ) -> Sources<'a> {
        Sources {
            fs,
            shell,
            props,
            platform,
            drm: &UnavailableDrm,
        }
    }

    #[test]
    fn sysfs_current_used_when_platform_silent() {
        let fs = MemoryFs::new()
            .with_file("/sys/class/power_supply/bms/current_now", "-1500000\n")
            .with_file("/sys/class/power_supply/battery/cycle_count", "321\n");
        let platform = FakePlatform {
            battery: Some(BatteryReading {
                state: ChargeState::Charging,
                voltage_mv: Some(4000),
                temperature_tenths: Some(312),
                ..BatteryReading::default()
            }),
            ..FakePlatform::default()
        };
        let (shell, props) = (ScriptedShell::new(), MapPropertyStore::new());
        let mut state = ProbeState::new();
        let snap = DynamicSnapshot::build(&sources(&fs, &shell, &props, &platform), 1, &mut state);

        assert_eq!(snap.battery.current_ma, 1500);
        assert_approx_eq!(snap.battery.power_watts, 6.0);
        assert_eq!(snap.battery.status, "charging");
        assert!(!snap.battery.is_fast_charging);
        assert_eq!(snap.battery.temperature_c, Some(31.2));
        assert_eq!(snap.battery.cycle_count, Some(321));
    }

    #[test]
    fn platform_current_skips_sysfs() {
        let fs = MemoryFs::new();
        let platform = FakePlatform {
            battery: Some(BatteryReading {
                state: ChargeState::Full,
                voltage_mv: Some(4400),
                current_ua: Some(-2_500_000),
                cycle_count: Some(12),
                ..BatteryReading::default()
            }),
            ..FakePlatform::default()
        };
        let (shell, props) = (ScriptedShell::new(), MapPropertyStore::new());
        let mut state = ProbeState::new();
        let snap = DynamicSnapshot::build(&sources(&fs, &shell, &props, &platform), 0, &mut state);
        assert_eq!(snap.battery.current_ma, 2500);
        assert!(snap.battery.is_fast_charging);
        assert_eq!(snap.battery.status, "full");
        assert_eq!(snap.battery.cycle_count, Some(12));
        assert!(!state.is_denied(FactCategory::BatteryCurrent));
    }

    #[test]
    fn repeated_ticks_stop_touching_denied_nodes() {
        let fs = MemoryFs::new();
        let platform = FakePlatform::default();
        let (shell, props) = (ScriptedShell::new(), MapPropertyStore::new());
        let src = sources(&fs, &shell, &props, &platform);
        let mut state = ProbeState::new();

        let first = DynamicSnapshot::build(&src, 4, &mut state);
        assert_eq!(first.battery.status, "not charging");
        assert_eq!(first.cpu.governor, UNKNOWN);
        let after_first = fs.io_count();

        for _ in 0..20 {
            DynamicSnapshot::build(&src, 4, &mut state);
        }
        assert_eq!(fs.io_count(), after_first);
        for category in [
            FactCategory::BatteryCurrent,
            FactCategory::BatteryCycles,
            FactCategory::CpuCurFreq,
            FactCategory::CpuGovernor,
            FactCategory::CpuTemperature,
        ] {
            assert!(state.is_denied(category), "{category} not denied");
        }
    }

    proptest! {
        #[test]
        fn normalized_current_is_bounded(raw in any::<i32>()) {
            let raw = i64::from(raw);
            let ma = normalize_current_ma(raw);
            prop_assert!(ma >= 0);
            if raw.abs() > MICROAMP_THRESHOLD {
                prop_assert_eq!(ma, raw.abs() / 1000);
            } else {
                prop_assert_eq!(ma, raw.abs());
            }
        }

        #[test]
        fn power_is_non_negative_and_rounded(ma in -20_000i64..20_000, mv in -5_000i64..5_000) {
            let w = compute_power_watts(ma, mv, true);
            prop_assert!(w >= 0.0);
            prop_assert!(((w * 100.0).round() - w * 100.0).abs() < 1e-6);
            prop_assert_eq!(compute_power_watts(ma, mv, false), 0.0);
        }
    }
}
