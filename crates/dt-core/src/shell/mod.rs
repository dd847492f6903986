//! Privileged shell execution.
//!
//! Two modes:
//!
//! - **one-shot**: one subprocess per command, stdout captured, exit status
//!   reduced to a boolean.
//! - **batch**: exactly one elevated subprocess for a whole list of
//!   commands, fed line by line through stdin and terminated by `exit`.
//!   Spawning the elevated shell dominates the cost of a write, so a batch
//!   of dozens of writes pays that cost once.
//!
//! Failures never escape as errors. A command that could not be spawned,
//! timed out, or exited non-zero is simply `success == false`; callers treat
//! that exactly like an unavailable fact.
//!
//! # Batch timeout
//!
//! When the batch deadline passes, [`ShellExecutor::exec_batch`] returns
//! [`BatchOutcome::TimedOut`] to its caller. The elevated subprocess is
//! left alone and may keep running; it is reaped by a detached thread
//! whenever it does exit.

mod su;

pub use su::{SuShell, SuShellBuilder};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Progress fires at index 0, every 10th step, and the last index.
pub const PROGRESS_STRIDE: usize = 10;

/// Upper bound on captured one-shot output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Internal spawn/wait failures. Reduced to [`ShellOutput::failed`] at the
/// trait boundary.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a one-shot command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    /// Exit status was 0.
    pub success: bool,
    /// Captured stdout; `None` when nothing could be captured.
    pub stdout: Option<String>,
}

impl ShellOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: Some(stdout.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            stdout: None,
        }
    }

    /// Trimmed stdout, if any and non-blank.
    pub fn text(&self) -> Option<&str> {
        self.stdout
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// How a batch ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every line was written and the shell exited.
    Completed { exit_code: Option<i32> },
    /// The deadline passed first. The subprocess may still be running.
    TimedOut { last_reported: Option<usize> },
    /// The elevated shell could not be started.
    SpawnFailed { reason: String },
    /// Nothing to run.
    Empty,
}

impl BatchOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, BatchOutcome::TimedOut { .. })
    }
}

/// Elevated command execution.
///
/// Implementations must be usable from the background context that owns
/// probing and tuning; they hold no per-call mutable state.
pub trait ShellExecutor: Send + Sync {
    /// Run one command through the elevated channel.
    fn exec(&self, command: &str) -> ShellOutput;

    /// Run the version flag of the elevation binary and return its banner.
    fn version_banner(&self) -> Option<String>;

    /// Run `commands` through a single elevated session.
    ///
    /// `on_progress(index, total)` is invoked on the calling thread for
    /// every index selected by [`should_report`], in order. Returns within
    /// `timeout` plus scheduling slack regardless of what the subprocess
    /// does.
    fn exec_batch(
        &self,
        commands: &[String],
        timeout: Duration,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BatchOutcome;
}

/// Whether progress fires for command `index` of `total`.
pub fn should_report(index: usize, total: usize) -> bool {
    index == 0 || (index + 1) % PROGRESS_STRIDE == 0 || index + 1 == total
}

/// Indices that fire for a batch of `total` commands.
pub fn report_indices(total: usize) -> impl Iterator<Item = usize> {
    (0..total).filter(move |&i| should_report(i, total))
}

/// Wrap a value in single quotes for `sh`, escaping embedded quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn has_glob(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Whether `path` needs the shell to expand it.
pub fn is_glob_path(path: &str) -> bool {
    has_glob(path)
}

/// Quote `path` for `sh`, leaving glob segments bare so they still expand.
///
/// Runs of literal segments are quoted together, so a root containing
/// spaces survives: `'/my root/sys/cpu'/cpu*/'cpufreq'`.
pub fn quote_path(path: &str) -> String {
    let mut out = String::new();
    let mut literal = String::new();
    for (i, segment) in path.split('/').enumerate() {
        let sep = if i == 0 { "" } else { "/" };
        if has_glob(segment) {
            if !literal.is_empty() {
                out.push_str(&shell_quote(&literal));
                literal.clear();
            }
            out.push_str(sep);
            out.push_str(segment);
        } else {
            literal.push_str(sep);
            literal.push_str(segment);
        }
    }
    if !literal.is_empty() {
        out.push_str(&shell_quote(&literal));
    }
    out
}

/// Privileged write-probe: prints `1` when `path` is writable.
pub fn writable_probe_command(path: &str) -> String {
    format!("if [ -w \"{path}\" ]; then echo '1'; else echo '0'; fi")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_for_common_sizes() {
        let collect = |n| report_indices(n).collect::<Vec<_>>();
        assert_eq!(collect(0), Vec::<usize>::new());
        assert_eq!(collect(1), vec![0]);
        assert_eq!(collect(9), vec![0, 8]);
        assert_eq!(collect(10), vec![0, 9]);
        assert_eq!(collect(11), vec![0, 9, 10]);
        assert_eq!(collect(37), vec![0, 9, 19, 29, 36]);
    }

    #[test]
    fn stride_never_exceeds_bound() {
        for total in 1..200usize {
            let fired = report_indices(total).count();
            assert!(fired <= total / PROGRESS_STRIDE + 2, "total {total} fired {fired}");
        }
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(shell_quote("schedutil"), "'schedutil'");
        assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    }

    #[test]
    fn literal_paths_are_quoted_whole() {
        assert_eq!(quote_path("/proc/sys/vm/swappiness"), "'/proc/sys/vm/swappiness'");
        assert_eq!(quote_path("/tmp/my root/proc/x"), "'/tmp/my root/proc/x'");
    }

    #[test]
    fn glob_segments_stay_bare() {
        assert_eq!(
            quote_path("/tmp/my root/sys/cpu/cpu*/cpufreq/scaling_governor"),
            "'/tmp/my root/sys/cpu'/cpu*/'cpufreq/scaling_governor'"
        );
        assert_eq!(quote_path("/sys/block/*"), "'/sys/block'/*");
        assert!(is_glob_path("/sys/cpu[0-3]/x"));
        assert!(!is_glob_path("/proc/sys/vm/swappiness"));
    }

    #[test]
    fn output_text_trims_and_filters_blank() {
        assert_eq!(ShellOutput::ok(" 1\n").text(), Some("1"));
        assert_eq!(ShellOutput::ok("  \n").text(), None);
        assert_eq!(ShellOutput::failed().text(), None);
    }

    #[test]
    fn probe_command_shape() {
        assert_eq!(
            writable_probe_command("/proc/sys/vm/swappiness"),
            "if [ -w \"/proc/sys/vm/swappiness\" ]; then echo '1'; else echo '0'; fi"
        );
    }
}
