//! The fixed tunable catalog.
//!
//! Order matters: batches are emitted in catalog order, and within an
//! entry in target order.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TunableGroup {
    Cpu,
    Gpu,
    Io,
    Memory,
    Network,
}

/// One persisted tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TunableSpec {
    /// Store key, e.g. `saved_governor`.
    pub key: &'static str,
    pub group: TunableGroup,
    /// Nodes written when the value is applied.
    pub targets: &'static [&'static str],
    /// Nodes tried when discovering the current value.
    pub probe_candidates: &'static [&'static str],
}

const fn spec(
    key: &'static str,
    group: TunableGroup,
    targets: &'static [&'static str],
    probe_candidates: &'static [&'static str],
) -> TunableSpec {
    TunableSpec {
        key,
        group,
        targets,
        probe_candidates,
    }
}

const fn single(key: &'static str, group: TunableGroup, target: &'static [&'static str]) -> TunableSpec {
    spec(key, group, target, target)
}

use TunableGroup::{Cpu, Gpu, Io, Memory, Network};

pub const CATALOG: &[TunableSpec] = &[
    // CPU frequency scaling, written to every core.
    spec(
        "saved_governor",
        Cpu,
        &["/sys/devices/system/cpu/cpu*/cpufreq/scaling_governor"],
        &["/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor"],
    ),
    spec(
        "saved_max_freq",
        Cpu,
        &["/sys/devices/system/cpu/cpu*/cpufreq/scaling_max_freq"],
        &["/sys/devices/system/cpu/cpu0/cpufreq/scaling_max_freq"],
    ),
    spec(
        "saved_min_freq",
        Cpu,
        &["/sys/devices/system/cpu/cpu*/cpufreq/scaling_min_freq"],
        &["/sys/devices/system/cpu/cpu0/cpufreq/scaling_min_freq"],
    ),
    single("saved_touchboost", Cpu, &["/sys/module/msm_performance/parameters/touchboost"]),
    single("saved_mc_power", Cpu, &["/sys/devices/system/cpu/sched_mc_power_savings"]),
    spec(
        "saved_power_collapse",
        Cpu,
        &["/sys/module/pm_8x60/parameters/sleep_mode"],
        &[
            "/sys/module/pm_8x60/parameters/sleep_mode",
            "/sys/module/lpm_levels/parameters/sleep_disabled",
        ],
    ),
    // Energy aware scheduling.
    spec(
        "saved_eas_enable",
        Cpu,
        &["/sys/devices/system/cpu/eas/enable"],
        &["/proc/sys/kernel/sched_energy_aware", "/sys/devices/system/cpu/eas/enable"],
    ),
    spec(
        "saved_sched_boost",
        Cpu,
        &["/proc/sys/kernel/sched_boost"],
        &["/proc/sys/kernel/sched_boost", "/sys/devices/system/cpu/eas/sched_boost"],
    ),
    spec(
        "saved_sched_upmigrate",
        Cpu,
        &["/proc/sys/kernel/sched_upmigrate"],
        &["/proc/sys/kernel/sched_upmigrate", "/sys/devices/system/cpu/eas/up_migrate"],
    ),
    spec(
        "saved_sched_downmigrate",
        Cpu,
        &["/proc/sys/kernel/sched_downmigrate"],
        &["/proc/sys/kernel/sched_downmigrate", "/sys/devices/system/cpu/eas/down_migrate"],
    ),
    spec(
        "saved_capacity_margin",
        Cpu,
        &["/proc/sys/kernel/sched_capacity_margin_up"],
        &[
            "/proc/sys/kernel/sched_capacity_margin_up",
            "/sys/devices/system/cpu/eas/capacity_margin",
        ],
    ),
    single("saved_init_task_util", Cpu, &["/proc/sys/kernel/sched_initial_task_util"]),
    single("saved_autogroup", Cpu, &["/proc/sys/kernel/sched_autogroup_enabled"]),
    // Governor tunables.
    single("saved_sched_uprate", Cpu, &["/sys/devices/system/cpu/cpufreq/schedutil/up_rate_limit_us"]),
    single("saved_interactive_hispeed", Cpu, &["/sys/devices/system/cpu/cpufreq/interactive/hispeed_freq"]),
    single("saved_walt_uprate", Cpu, &["/sys/devices/system/cpu/cpufreq/walt/up_rate_limit_us"]),
    single("saved_walt_downrate", Cpu, &["/sys/devices/system/cpu/cpufreq/walt/down_rate_limit_us"]),
    // Adreno.
    single("saved_gpu_governor", Gpu, &["/sys/class/kgsl/kgsl-3d0/devfreq/governor"]),
    single("saved_gpu_max_freq", Gpu, &["/sys/class/kgsl/kgsl-3d0/devfreq/max_freq"]),
    single("saved_gpu_min_freq", Gpu, &["/sys/class/kgsl/kgsl-3d0/devfreq/min_freq"]),
    single("saved_adreno_idler", Gpu, &["/sys/module/adreno_idler/parameters/adreno_idler_active"]),
    single("saved_gpu_idle_timer", Gpu, &["/sys/class/kgsl/kgsl-3d0/idle_timer"]),
    single("saved_adrenoboost", Gpu, &["/sys/class/kgsl/kgsl-3d0/devfreq/adrenoboost"]),
    // Block queues. eMMC and UFS devices are both written.
    single(
        "saved_scheduler",
        Io,
        &["/sys/block/mmcblk0/queue/scheduler", "/sys/block/sda/queue/scheduler"],
    ),
    single(
        "saved_readahead",
        Io,
        &["/sys/block/sda/queue/read_ahead_kb", "/sys/block/mmcblk0/queue/read_ahead_kb"],
    ),
    single(
        "saved_nr_requests",
        Io,
        &["/sys/block/sda/queue/nr_requests", "/sys/block/mmcblk0/queue/nr_requests"],
    ),
    single(
        "saved_add_random",
        Io,
        &["/sys/block/sda/queue/add_random", "/sys/block/mmcblk0/queue/add_random"],
    ),
    single(
        "saved_iostats",
        Io,
        &["/sys/block/sda/queue/iostats", "/sys/block/mmcblk0/queue/iostats"],
    ),
    // VM.
    single("saved_zram_comp", Memory, &["/sys/block/zram0/comp_algorithm"]),
    single("saved_swappiness", Memory, &["/proc/sys/vm/swappiness"]),
    single("saved_page_cluster", Memory, &["/proc/sys/vm/page-cluster"]),
    single("saved_vfs", Memory, &["/proc/sys/vm/vfs_cache_pressure"]),
    single("saved_mglru", Memory, &["/sys/kernel/mm/lru_gen/enabled"]),
    single("saved_watermark_scale", Memory, &["/proc/sys/vm/watermark_scale_factor"]),
    single("saved_dirty_ratio", Memory, &["/proc/sys/vm/dirty_ratio"]),
    single("saved_dirty_bg_ratio", Memory, &["/proc/sys/vm/dirty_background_ratio"]),
    // Network stack.
    single("saved_tcp", Network, &["/proc/sys/net/ipv4/tcp_congestion_control"]),
    single("saved_tcp_fastopen", Network, &["/proc/sys/net/ipv4/tcp_fastopen"]),
    single("saved_tcp_ecn", Network, &["/proc/sys/net/ipv4/tcp_ecn"]),
    single("saved_tcp_window", Network, &["/proc/sys/net/ipv4/tcp_window_scaling"]),
    single(
        "saved_disable_ipv6",
        Network,
        &[
            "/proc/sys/net/ipv6/conf/all/disable_ipv6",
            "/proc/sys/net/ipv6/conf/default/disable_ipv6",
        ],
    ),
];

pub fn lookup(key: &str) -> Option<&'static TunableSpec> {
    CATALOG.iter().find(|t| t.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique_and_namespaced() {
        let mut seen = HashSet::new();
        for t in CATALOG {
            assert!(t.key.starts_with("saved_"), "{}", t.key);
            assert!(seen.insert(t.key), "duplicate {}", t.key);
            assert!(!t.targets.is_empty());
            assert!(!t.probe_candidates.is_empty());
        }
    }

    #[test]
    fn only_cpufreq_targets_use_globs() {
        for t in CATALOG {
            for target in t.targets {
                if target.contains('*') {
                    assert!(target.starts_with("/sys/devices/system/cpu/cpu*/cpufreq/"), "{target}");
                }
            }
            assert!(t.probe_candidates.iter().all(|p| !p.contains('*')), "{}", t.key);
        }
    }

    #[test]
    fn lookup_by_key() {
        let sched = lookup("saved_scheduler").unwrap();
        assert_eq!(sched.group, TunableGroup::Io);
        assert_eq!(sched.targets.len(), 2);
        assert_eq!(sched.targets[0], "/sys/block/mmcblk0/queue/scheduler");
        assert!(lookup("saved_nothing").is_none());
    }
}
