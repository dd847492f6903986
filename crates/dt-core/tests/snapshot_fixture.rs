//! A full diagnostic session against fake device sources.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use dt_config::TunableStore;
use dt_core::platform::{BatteryReading, ChargeState, MemoryInfo};
use dt_core::poller::DynamicPoller;
use dt_core::probe::ProbeState;
use dt_core::props::MapPropertyStore;
use dt_core::root::RootIdentity;
use dt_core::shell::writable_probe_command;
use dt_core::snapshot::{Category, CategoryView, DynamicSnapshot, SharedSources, StaticSnapshot};
use dt_core::test_utils::{FakeDrm, FakePlatform, MemoryFs, ScriptedShell};
use dt_core::tuning::probe_tunables;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;
const SWAPPINESS: &str = "/proc/sys/vm/swappiness";

fn device_fs() -> MemoryFs {
    MemoryFs::new()
        .with_file("/sys/devices/system/cpu/possible", "0-1")
        .with_file("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq", "1800000")
        .with_file("/sys/devices/system/cpu/cpu1/cpufreq/cpuinfo_max_freq", "2400000")
        .with_file("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor", "schedutil\n")
        .with_file("/proc/sys/kernel/osrelease", "5.15.110-android13-8\n")
        .with_file(SWAPPINESS, "100\n")
}

fn charging_platform() -> FakePlatform {
    FakePlatform {
        memory: Some(MemoryInfo {
            total_bytes: 6 * 1024 * MIB,
            available_bytes: 2 * 1024 * MIB,
        }),
        battery: Some(BatteryReading {
            level_percent: Some(64),
            state: ChargeState::Charging,
            voltage_mv: Some(5000),
            current_ua: Some(3_000_000),
            cycle_count: Some(212),
            ..BatteryReading::default()
        }),
        uptime_ms: Some(3_723_000),
        ..FakePlatform::default()
    }
}

fn sources(fs: MemoryFs, shell: ScriptedShell) -> SharedSources {
    SharedSources {
        fs: Arc::new(fs),
        shell: Arc::new(shell),
        props: Arc::new(
            MapPropertyStore::new()
                .with("ro.product.model", "Pixel 8")
                .with("ro.product.manufacturer", "Google")
                .with("ro.build.version.sdk", "34"),
        ),
        platform: Arc::new(charging_platform()),
        drm: Arc::new(FakeDrm::widevine().with("securityLevel", "L1")),
    }
}

#[test]
fn session_builds_static_then_dynamic() {
    let shell = ScriptedShell::rooted("27.0:MAGISK");
    let shared = sources(device_fs(), shell);
    let view = shared.borrow();

    let root = RootIdentity::detect(view.shell, view.fs);
    assert!(root.is_rooted);
    assert_eq!(root.manager_name, "Magisk");

    let mut state = ProbeState::new();
    let static_snapshot = StaticSnapshot::build(&view, &root, &mut state);
    assert_eq!(static_snapshot.identity.model, "Pixel 8");
    assert_eq!(static_snapshot.hardware.core_count, 2);
    assert_eq!(static_snapshot.hardware.max_freq_mhz, vec![1800, 2400]);
    assert_eq!(static_snapshot.root.manager_name, "Magisk");
    assert_eq!(static_snapshot.drm.security_level, "L1");

    let dynamic = DynamicSnapshot::build(&view, static_snapshot.hardware.core_count, &mut state);
    assert_eq!(dynamic.battery.current_ma, 3000);
    assert!((dynamic.battery.power_watts - 15.0).abs() < 1e-9);
    assert!(dynamic.battery.is_fast_charging);
    assert_eq!(dynamic.battery.cycle_count, Some(212));
    assert_eq!(dynamic.cpu.governor, "schedutil");

    let views = CategoryView::render(&static_snapshot, &dynamic);
    assert_eq!(views.len(), Category::ALL.len());
    let battery = views.iter().find(|v| v.category == Category::Battery).unwrap();
    let row = |label: &str| battery.rows.iter().find(|r| r.label == label).map(|r| r.value.as_str());
    assert_eq!(row("Charging Power"), Some("15.00 W"));
    assert_eq!(row("System Uptime"), Some("01 hrs 02 mins 03 secs"));
}

#[test]
fn poller_shares_one_probe_state() {
    let fs = device_fs();
    let shared = sources(fs, ScriptedShell::new());
    let (poller, ticks) = DynamicPoller::start(shared, 2, Duration::from_millis(5)).unwrap();

    let snapshots: Vec<_> = ticks.iter().take(3).collect();
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.iter().all(|s| s.battery.current_ma == 3000));
    for pair in snapshots.windows(2) {
        assert!(pair[0].stamp.generated_at <= pair[1].stamp.generated_at);
    }

    drop(ticks);
    let state = poller.stop().expect("poller thread state");
    assert!(state.tick_count >= 3);
    assert!(state.probe.denied_count() > 0);
}

#[test]
fn tunable_discovery_reports_saved_and_live() {
    let fs = device_fs();
    let shell = ScriptedShell::rooted("").respond(&writable_probe_command(SWAPPINESS), true, "1\n");

    let dir = TempDir::new().unwrap();
    let mut store = TunableStore::open(dir.path().join("tweaks.json")).unwrap();
    store.set_string("saved_swappiness", "60");

    let mut state = ProbeState::new();
    let statuses = probe_tunables(&mut state, &fs, &shell, &store);
    let swappiness = statuses.iter().find(|s| s.key == "saved_swappiness").unwrap();
    assert_eq!(swappiness.saved.as_deref(), Some("60"));
    let live = swappiness.live.as_ref().unwrap();
    assert_eq!(live.value, "100");
    assert!(live.writable);

    let governor = statuses.iter().find(|s| s.key == "saved_governor").unwrap();
    assert!(governor.saved.is_none());
    assert!(governor.live.is_none());

    let denied = state.denied_count();
    assert!(denied > 0);
    let io_before = fs.io_count();
    let again = probe_tunables(&mut state, &fs, &shell, &store);
    assert_eq!(again.len(), statuses.len());
    assert_eq!(state.denied_count(), denied);
    assert!(fs.io_count() > io_before);
    assert!(fs.io_count() - io_before < io_before);
}
