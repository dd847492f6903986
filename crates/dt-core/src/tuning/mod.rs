//! Tunable batches and their application.
//!
//! The applier reads every catalog key from the persisted store, compiles
//! the present ones into an ordered list of shell writes, and pushes the
//! whole list through one elevated session:
//!
//! ```text
//! Idle -> Building -> Executing -> Done
//! ```
//!
//! `Done` is reached whether the batch completed, stopped early, or ran out
//! of time. Application is best-effort: individual writes are not
//! verified, nothing is retried, nothing is rolled back, and the terminal
//! progress event always reports the tunables as active.

pub mod catalog;

pub use catalog::{lookup, TunableGroup, TunableSpec, CATALOG};

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use dt_common::Error;
use dt_config::store::{TunableStore, SERVICE_RUNNING};

use crate::events::{status, ProgressEmitter, ProgressEvent};
use crate::logging::event_names;
use crate::probe::{probe_tunable, FactCategory, ProbeResult, ProbeState};
use crate::shell::{is_glob_path, quote_path, shell_quote, BatchOutcome, ShellExecutor};
use crate::sysfs::NodeReader;

pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One shell write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunableCommand {
    pub key: &'static str,
    /// Target as the elevated shell sees it. Globs are left for the shell
    /// to expand.
    pub path: String,
    pub value: String,
}

impl TunableCommand {
    /// One `sh` line. A glob target becomes a loop, since a redirection
    /// cannot fan out to several files.
    pub fn render(&self) -> String {
        let value = shell_quote(&self.value);
        if is_glob_path(&self.path) {
            format!("for f in {}; do echo {value} > \"$f\"; done", quote_path(&self.path))
        } else {
            format!("echo {value} > {}", quote_path(&self.path))
        }
    }
}

/// Ordered writes compiled from the store. Consumed by one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TuningBatch {
    pub commands: Vec<TunableCommand>,
}

impl TuningBatch {
    /// Compile every present catalog key, in catalog order.
    ///
    /// Absent keys are skipped. The same store always yields the same
    /// batch.
    pub fn build(store: &TunableStore, fs: &dyn NodeReader) -> Self {
        let commands = CATALOG
            .iter()
            .filter_map(|spec| store.get_string(spec.key).map(|value| (spec, value)))
            .flat_map(|(spec, value)| {
                spec.targets.iter().map(move |target| TunableCommand {
                    key: spec.key,
                    path: fs.shell_path(target),
                    value: value.to_string(),
                })
            })
            .collect();
        Self { commands }
    }

    pub fn total(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.commands.iter().map(TunableCommand::render).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Idle,
    Building,
    Executing,
    Done,
}

/// What one application did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub total: usize,
    pub keys: Vec<&'static str>,
    pub outcome: BatchOutcome,
    /// Always the optimistic terminal status.
    pub status: String,
    pub elapsed_ms: u64,
}

pub struct TuningApplier<'a> {
    shell: &'a dyn ShellExecutor,
    fs: &'a dyn NodeReader,
    emitter: &'a dyn ProgressEmitter,
    timeout: Duration,
    phase: ApplyPhase,
}

impl<'a> TuningApplier<'a> {
    pub fn new(shell: &'a dyn ShellExecutor, fs: &'a dyn NodeReader, emitter: &'a dyn ProgressEmitter) -> Self {
        Self {
            shell,
            fs,
            emitter,
            timeout: DEFAULT_BATCH_TIMEOUT,
            phase: ApplyPhase::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn phase(&self) -> ApplyPhase {
        self.phase
    }

    /// Build and execute one batch from `store`.
    ///
    /// Marks the service as running in the store before executing. Store
    /// write failures are logged and otherwise ignored.
    pub fn run(&mut self, store: &mut TunableStore) -> ApplyReport {
        let started = Instant::now();

        self.phase = ApplyPhase::Building;
        let batch = TuningBatch::build(store, self.fs);
        let total = batch.total();
        let mut keys: Vec<&'static str> = batch.commands.iter().map(|c| c.key).collect();
        keys.dedup();
        debug!(target: event_names::BUILD_FINISHED, total, keys = keys.len(), "batch built");

        self.phase = ApplyPhase::Executing;
        store.set_bool(SERVICE_RUNNING, true);
        if let Err(e) = store.save() {
            warn!(error = %e, "could not persist service state");
        }

        let outcome = if batch.is_empty() {
            BatchOutcome::Empty
        } else {
            info!(target: event_names::APPLY_STARTED, total, timeout_secs = self.timeout.as_secs(), "applying tunables");
            self.emitter.emit(ProgressEvent::started(total));

            let lines = batch.lines();
            let emitter = self.emitter;
            let mut on_progress = |index: usize, total: usize| {
                debug!(target: event_names::APPLY_PROGRESS, step = index + 1, total, "batch progress");
                emitter.emit(ProgressEvent::progress(index + 1, total));
            };
            self.shell.exec_batch(&lines, self.timeout, &mut on_progress)
        };

        match &outcome {
            BatchOutcome::TimedOut { last_reported } => warn!(
                target: event_names::APPLY_TIMEOUT,
                total,
                last_reported = ?last_reported,
                "batch did not finish in time"
            ),
            BatchOutcome::SpawnFailed { reason } => warn!(reason = %reason, "batch shell failed to start"),
            _ => {}
        }

        self.phase = ApplyPhase::Done;
        self.emitter.emit(ProgressEvent::complete(total));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            target: event_names::APPLY_FINISHED,
            total,
            elapsed_ms,
            timed_out = outcome.timed_out(),
            "tunables applied"
        );

        ApplyReport {
            total,
            keys,
            outcome,
            status: status::ACTIVE.to_string(),
            elapsed_ms,
        }
    }
}

/// Saved and live state of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunableStatus {
    pub key: &'static str,
    pub group: TunableGroup,
    pub saved: Option<String>,
    /// First candidate that is both readable and writable.
    pub live: Option<ProbeResult>,
}

/// Discover which catalog entries this device exposes.
pub fn probe_tunables(
    state: &mut ProbeState,
    fs: &dyn NodeReader,
    shell: &dyn ShellExecutor,
    store: &TunableStore,
) -> Vec<TunableStatus> {
    CATALOG
        .iter()
        .map(|spec| TunableStatus {
            key: spec.key,
            group: spec.group,
            saved: store.get_string(spec.key).map(str::to_string),
            live: probe_tunable(state, fs, shell, FactCategory::Tunable(spec.key), spec.probe_candidates),
        })
        .collect()
}

/// Result of an interactive write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetOutcome {
    pub key: &'static str,
    pub value: String,
    pub written: Vec<String>,
    pub failed: Vec<String>,
}

/// Write `value` to every target of `key` now, then persist it.
///
/// Nothing is persisted when no target accepted the write.
pub fn set_tunable(
    shell: &dyn ShellExecutor,
    fs: &dyn NodeReader,
    store: &mut TunableStore,
    key: &str,
    value: &str,
) -> Result<SetOutcome, Error> {
    let spec = lookup(key).ok_or_else(|| Error::UnknownTunable { key: key.to_string() })?;

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for target in spec.targets {
        let command = TunableCommand {
            key: spec.key,
            path: fs.shell_path(target),
            value: value.to_string(),
        };
        if shell.exec(&command.render()).success {
            written.push(command.path);
        } else {
            failed.push(command.path);
        }
    }

    if written.is_empty() {
        return Err(Error::TunableUnwritable { key: spec.key.to_string() });
    }

    store.set_string(spec.key, value);
    store.save()?;
    debug!(target: event_names::STORE_SAVED, key = spec.key, "tunable saved");

    Ok(SetOutcome {
        key: spec.key,
        value: value.to_string(),
        written,
        failed,
    })
}

/// Forget the saved value of `key`. Returns whether one existed.
pub fn unset_tunable(store: &mut TunableStore, key: &str) -> Result<bool, Error> {
    let spec = lookup(key).ok_or_else(|| Error::UnknownTunable { key: key.to_string() })?;
    let removed = store.remove(spec.key).is_some();
    if removed {
        store.save()?;
        debug!(target: event_names::STORE_SAVED, key = spec.key, "tunable removed");
    }
    Ok(removed)
}
