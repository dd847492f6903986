//! CPU topology, frequency, governor and temperature facts.

use tracing::debug;

use crate::logging::event_names;
use crate::probe::{probe, probe_all, FactCategory, ProbeState};
use crate::shell::{quote_path, ShellExecutor};
use crate::sysfs::NodeReader;

pub const CPU_ROOT: &str = "/sys/devices/system/cpu";

/// One privileged read covering every core.
pub const MAX_FREQ_GLOB: &str = "/sys/devices/system/cpu/cpu*/cpufreq/cpuinfo_max_freq";

/// Upper bound on a parsed cpu list. Larger counts mean a corrupt node.
pub const MAX_CPUS: usize = 4096;

pub const GOVERNOR_NODE: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor";

pub const TEMPERATURE_NODES: &[&str] = &[
    "/sys/class/thermal/thermal_zone0/temp",
    "/sys/class/thermal/thermal_zone1/temp",
    "/sys/devices/system/cpu/cpu0/cpufreq/cpu_temp",
    "/sys/class/hwmon/hwmon0/temp1_input",
];

/// Number of CPUs in a kernel cpu list such as `0-3,6,7`.
///
/// `None` for malformed lists, including counts above [`MAX_CPUS`].
pub fn parse_cpu_list(list: &str) -> Option<usize> {
    let mut count = 0usize;
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().ok()?;
                let hi: usize = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                let span = (hi - lo).checked_add(1)?;
                count = count.checked_add(span)?;
            }
            None => {
                part.trim().parse::<usize>().ok()?;
                count = count.checked_add(1)?;
            }
        }
    }
    (count > 0 && count <= MAX_CPUS).then_some(count)
}

/// Possible CPUs, falling back to what this process can see.
pub fn core_count(fs: &dyn NodeReader) -> usize {
    fs.read_trimmed(&format!("{CPU_ROOT}/possible"))
        .and_then(|s| parse_cpu_list(&s))
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}

pub fn per_core_paths(cores: usize, node: &str) -> Vec<String> {
    (0..cores)
        .map(|i| format!("{CPU_ROOT}/cpu{i}/cpufreq/{node}"))
        .collect()
}

/// kHz text to MHz.
pub fn khz_to_mhz(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().map(|khz| khz / 1000)
}

fn all_mhz(values: &[String]) -> Option<Vec<u32>> {
    values.iter().map(|v| khz_to_mhz(v)).collect()
}

/// Per-core maximum frequency in MHz.
///
/// Per-core nodes first. If any core cannot be read, and the device is
/// rooted, one privileged glob read replaces the whole list.
pub fn max_frequencies(
    state: &mut ProbeState,
    fs: &dyn NodeReader,
    shell: &dyn ShellExecutor,
    rooted: bool,
    cores: usize,
) -> Vec<u32> {
    let paths = per_core_paths(cores, "cpuinfo_max_freq");
    if let Some(mhz) = probe_all(state, fs, FactCategory::CpuMaxFreq, &paths).and_then(|v| all_mhz(&v)) {
        return mhz;
    }
    if !rooted {
        return Vec::new();
    }

    debug!(target: event_names::PROBE_FALLBACK, category = %FactCategory::CpuMaxFreq, "privileged glob read");
    shell
        .exec(&format!("cat {}", quote_path(&fs.shell_path(MAX_FREQ_GLOB))))
        .text()
        .map(|out| out.lines().filter_map(khz_to_mhz).collect())
        .unwrap_or_default()
}

/// Per-core current frequency in MHz. Empty once denied.
pub fn current_frequencies(state: &mut ProbeState, fs: &dyn NodeReader, cores: usize) -> Vec<u32> {
    let paths = per_core_paths(cores, "scaling_cur_freq");
    let Some(values) = probe_all(state, fs, FactCategory::CpuCurFreq, &paths) else {
        return Vec::new();
    };
    match all_mhz(&values) {
        Some(mhz) => mhz,
        None => {
            state.deny(FactCategory::CpuCurFreq);
            Vec::new()
        }
    }
}

pub fn governor(state: &mut ProbeState, fs: &dyn NodeReader) -> Option<String> {
    probe(state, fs, FactCategory::CpuGovernor, &[GOVERNOR_NODE]).map(|r| r.value)
}

/// Thermal zones report milli-degrees; some vendors report degrees.
pub fn normalize_temperature(raw: f64) -> f64 {
    if raw > 1000.0 {
        raw / 1000.0
    } else {
        raw
    }
}

/// CPU temperature in °C.
pub fn temperature(state: &mut ProbeState, fs: &dyn NodeReader) -> Option<f64> {
    let hit = probe(state, fs, FactCategory::CpuTemperature, TEMPERATURE_NODES)?;
    hit.value.parse::<f64>().ok().map(normalize_temperature)
}
