//! Fact resolution with denial memoization.
//!
//! A fact is resolved from an ordered list of candidate sources; the first
//! one that yields a non-empty value wins. When every candidate fails, the
//! fact's category is marked denied in [`ProbeState`] and no further I/O is
//! attempted for it for as long as that state lives. The dynamic poller
//! runs every second, so this is what keeps a device with locked-down
//! thermal or battery nodes from paying for the same failed reads forever.
//!
//! The state is a plain value passed by `&mut` through the snapshot
//! builders. Whoever owns it decides its lifetime.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::event_names;
use crate::shell::{writable_probe_command, ShellExecutor};
use crate::sysfs::NodeReader;

/// Fact categories subject to denial memoization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "key")]
pub enum FactCategory {
    CpuMaxFreq,
    CpuCurFreq,
    CpuGovernor,
    CpuTemperature,
    BatteryCurrent,
    BatteryCycles,
    KernelVersion,
    /// A catalog tunable, by store key.
    Tunable(&'static str),
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactCategory::CpuMaxFreq => write!(f, "cpu_max_freq"),
            FactCategory::CpuCurFreq => write!(f, "cpu_cur_freq"),
            FactCategory::CpuGovernor => write!(f, "cpu_governor"),
            FactCategory::CpuTemperature => write!(f, "cpu_temperature"),
            FactCategory::BatteryCurrent => write!(f, "battery_current"),
            FactCategory::BatteryCycles => write!(f, "battery_cycles"),
            FactCategory::KernelVersion => write!(f, "kernel_version"),
            FactCategory::Tunable(key) => write!(f, "tunable:{key}"),
        }
    }
}

/// Categories whose sources are known to be exhausted.
///
/// Denials are never lifted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeState {
    denied: BTreeSet<FactCategory>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_denied(&self, category: FactCategory) -> bool {
        self.denied.contains(&category)
    }

    pub fn deny(&mut self, category: FactCategory) {
        if self.denied.insert(category) {
            debug!(target: event_names::PROBE_DENIED, %category, "category denied");
        }
    }

    pub fn denied(&self) -> impl Iterator<Item = FactCategory> + '_ {
        self.denied.iter().copied()
    }

    pub fn denied_count(&self) -> usize {
        self.denied.len()
    }
}

/// One successfully resolved candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub path: String,
    pub value: String,
    pub writable: bool,
}

/// First readable, non-empty candidate node.
///
/// Returns `None` immediately for a denied category; denies it when every
/// candidate fails.
pub fn probe(
    state: &mut ProbeState,
    fs: &dyn NodeReader,
    category: FactCategory,
    candidates: &[&str],
) -> Option<ProbeResult> {
    if state.is_denied(category) {
        return None;
    }

    for path in candidates {
        if !fs.exists(path) {
            continue;
        }
        if let Some(value) = fs.read_trimmed(path) {
            return Some(ProbeResult {
                path: (*path).to_string(),
                value,
                writable: false,
            });
        }
    }

    state.deny(category);
    None
}

/// Every node in `paths` must read, or the category is denied.
///
/// Used for per-core facts where a partial answer is worse than none.
pub fn probe_all(
    state: &mut ProbeState,
    fs: &dyn NodeReader,
    category: FactCategory,
    paths: &[String],
) -> Option<Vec<String>> {
    if state.is_denied(category) || paths.is_empty() {
        return None;
    }

    let mut values = Vec::with_capacity(paths.len());
    for path in paths {
        match fs.read_trimmed(path) {
            Some(v) => values.push(v),
            None => {
                state.deny(category);
                return None;
            }
        }
    }
    Some(values)
}

/// Whether privileged `cat` output is a real value rather than an error.
pub fn is_valid_read(output: &str) -> bool {
    let trimmed = output.trim();
    !trimmed.is_empty()
        && !trimmed.contains("No such file")
        && !trimmed.contains("Not a directory")
        && !trimmed.contains("Permission denied")
}

/// First candidate that is both readable and writable.
///
/// Reads try the node directly, then a privileged `cat`. Writability is
/// checked through the elevated shell since kernel nodes are usually
/// root-writable only.
pub fn probe_tunable(
    state: &mut ProbeState,
    fs: &dyn NodeReader,
    shell: &dyn ShellExecutor,
    category: FactCategory,
    candidates: &[&str],
) -> Option<ProbeResult> {
    if state.is_denied(category) {
        return None;
    }

    for path in candidates {
        let host_path = fs.shell_path(path);
        let value = match fs.read_trimmed(path) {
            Some(v) => Some(v),
            None => shell
                .exec(&format!("cat \"{host_path}\""))
                .text()
                .filter(|s| is_valid_read(s))
                .map(str::to_string),
        };
        let Some(value) = value else {
            continue;
        };

        let writable = shell
            .exec(&writable_probe_command(&host_path))
            .text()
            .is_some_and(|s| s == "1");
        if writable {
            return Some(ProbeResult {
                path: (*path).to_string(),
                value,
                writable: true,
            });
        }
        debug!(path, "readable but not writable");
    }

    state.deny(category);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryFs, ScriptedShell};

    const GOV: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor";
    const TEMP_CANDIDATES: &[&str] = &[
        "/sys/class/thermal/thermal_zone0/temp",
        "/sys/class/thermal/thermal_zone1/temp",
    ];

    #[test]
    fn first_non_empty_candidate_wins() {
        let fs = MemoryFs::new()
            .with_file(TEMP_CANDIDATES[0], "   \n")
            .with_file(TEMP_CANDIDATES[1], "41000\n");
        let mut state = ProbeState::new();
        let hit = probe(&mut state, &fs, FactCategory::CpuTemperature, TEMP_CANDIDATES).unwrap();
        assert_eq!(hit.path, TEMP_CANDIDATES[1]);
        assert_eq!(hit.value, "41000");
        assert!(!state.is_denied(FactCategory::CpuTemperature));
    }

    #[test]
    fn denied_category_performs_no_io() {
        let fs = MemoryFs::new();
        let mut state = ProbeState::new();

        assert!(probe(&mut state, &fs, FactCategory::CpuTemperature, TEMP_CANDIDATES).is_none());
        assert!(state.is_denied(FactCategory::CpuTemperature));
        let after_first = fs.io_count();
        assert!(after_first > 0);

        for _ in 0..50 {
            assert!(probe(&mut state, &fs, FactCategory::CpuTemperature, TEMP_CANDIDATES).is_none());
        }
        assert_eq!(fs.io_count(), after_first);
    }

    #[test]
    fn denial_is_per_category() {
        let fs = MemoryFs::new().with_file(GOV, "schedutil");
        let mut state = ProbeState::new();
        probe(&mut state, &fs, FactCategory::CpuTemperature, TEMP_CANDIDATES);
        let hit = probe(&mut state, &fs, FactCategory::CpuGovernor, &[GOV]);
        assert_eq!(hit.map(|r| r.value).as_deref(), Some("schedutil"));
        assert_eq!(state.denied_count(), 1);
    }

    #[test]
    fn node_appearing_later_stays_denied() {
        let mut fs = MemoryFs::new();
        let mut state = ProbeState::new();
        probe(&mut state, &fs, FactCategory::CpuGovernor, &[GOV]);
        fs.insert(GOV, "performance");
        assert!(probe(&mut state, &fs, FactCategory::CpuGovernor, &[GOV]).is_none());
    }

    #[test]
    fn probe_all_requires_every_path() {
        let paths: Vec<String> = (0..3)
            .map(|i| format!("/sys/devices/system/cpu/cpu{i}/cpufreq/scaling_cur_freq"))
            .collect();
        let fs = MemoryFs::new()
            .with_file(&paths[0], "1800000")
            .with_file(&paths[1], "1800000");
        let mut state = ProbeState::new();
        assert!(probe_all(&mut state, &fs, FactCategory::CpuCurFreq, &paths).is_none());
        assert!(state.is_denied(FactCategory::CpuCurFreq));
        let reads = fs.io_count();
        assert!(probe_all(&mut state, &fs, FactCategory::CpuCurFreq, &paths).is_none());
        assert_eq!(fs.io_count(), reads);
    }

    #[test]
    fn valid_read_rejects_shell_errors() {
        assert!(is_valid_read("bbr"));
        assert!(!is_valid_read(""));
        assert!(!is_valid_read("cat: /sys/x: No such file or directory"));
        assert!(!is_valid_read("cat: /sys/x/y: Not a directory"));
    }

    #[test]
    fn tunable_must_be_writable() {
        const EAS: &[&str] = &[
            "/proc/sys/kernel/sched_energy_aware",
            "/sys/devices/system/cpu/eas/enable",
        ];
        let fs = MemoryFs::new()
            .with_file(EAS[0], "1")
            .with_file(EAS[1], "0");
        let shell = ScriptedShell::new()
            .respond(&writable_probe_command(EAS[0]), true, "0")
            .respond(&writable_probe_command(EAS[1]), true, "1");
        let mut state = ProbeState::new();
        let hit = probe_tunable(
            &mut state,
            &fs,
            &shell,
            FactCategory::Tunable("saved_eas_enable"),
            EAS,
        )
        .unwrap();
        assert_eq!(hit.path, EAS[1]);
        assert_eq!(hit.value, "0");
        assert!(hit.writable);
    }

    #[test]
    fn tunable_read_falls_back_to_privileged_cat() {
        const NODE: &str = "/proc/sys/net/ipv4/tcp_congestion_control";
        let shell = ScriptedShell::new()
            .respond(&format!("cat \"{NODE}\""), true, "bbr\n")
            .respond(&writable_probe_command(NODE), true, "1");
        let mut state = ProbeState::new();
        let hit = probe_tunable(
            &mut state,
            &MemoryFs::new(),
            &shell,
            FactCategory::Tunable("saved_tcp"),
            &[NODE],
        )
        .unwrap();
        assert_eq!(hit.value, "bbr");
    }

    #[test]
    fn unresolvable_tunable_is_denied() {
        let shell = ScriptedShell::new();
        let mut state = ProbeState::new();
        let cat = FactCategory::Tunable("saved_mglru");
        assert!(probe_tunable(&mut state, &MemoryFs::new(), &shell, cat, &["/sys/kernel/mm/lru_gen/enabled"]).is_none());
        assert!(state.is_denied(cat));
        let calls = shell.exec_count();
        probe_tunable(&mut state, &MemoryFs::new(), &shell, cat, &["/sys/kernel/mm/lru_gen/enabled"]);
        assert_eq!(shell.exec_count(), calls);
    }
}
