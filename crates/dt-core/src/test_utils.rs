//! Test utilities for dt-core.
//!
//! In-process fakes for every seam the engine talks through:
//! - `MemoryFs`: a counting in-memory node tree
//! - `ScriptedShell`: canned one-shot answers, recorded batches
//! - `FakePlatform` / `FakeDrm`: opaque platform services
//! - `RecordingEmitter`: captured progress events

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::events::{ProgressEmitter, ProgressEvent};
use crate::platform::{
    BatteryReading, CameraInfo, DisplayInfo, DrmError, DrmProvider, FeatureSet, MemoryInfo,
    NetworkInfo, PlatformSource, StorageInfo, WIDEVINE_UUID,
};
use crate::shell::{should_report, BatchOutcome, ShellExecutor, ShellOutput};
use crate::sysfs::NodeReader;

// ============================================================================
// Macros
// ============================================================================

/// Assert that two floating point numbers are approximately equal.
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1e-9_f64)
    };
    ($a:expr, $b:expr, $epsilon:expr) => {{
        let a: f64 = $a;
        let b: f64 = $b;
        let eps: f64 = $epsilon;
        let diff = (a - b).abs();
        if diff > eps {
            panic!(
                "assertion failed: `(left ~= right)` (left: `{}`, right: `{}`, diff: `{}`, epsilon: `{}`)",
                a, b, diff, eps
            );
        }
    }};
}

// ============================================================================
// Fixtures
// ============================================================================

// ============================================================================
// MemoryFs
// ============================================================================

/// In-memory node tree that counts `exists`/`read` calls.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, String>,
    io: AtomicUsize,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
    }

    /// Number of `exists` + `read` calls so far.
    pub fn io_count(&self) -> usize {
        self.io.load(Ordering::SeqCst)
    }

    fn is_dir(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.files.keys().any(|k| k.starts_with(&prefix))
    }
}

impl NodeReader for MemoryFs {
    fn resolve(&self, path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.io.fetch_add(1, Ordering::SeqCst);
        self.files.contains_key(path) || self.is_dir(path)
    }

    fn read(&self, path: &str) -> Option<String> {
        self.io.fetch_add(1, Ordering::SeqCst);
        self.files.get(path).cloned()
    }

    fn list_dir(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut names: Vec<String> = self
            .files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

// ============================================================================
// ScriptedShell
// ============================================================================

/// Shell with canned answers. Unknown commands fail.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    responses: BTreeMap<String, ShellOutput>,
    banner: Option<String>,
    stall_at: Option<usize>,
    calls: Mutex<Vec<String>>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: &str, success: bool, stdout: &str) -> Self {
        let output = ShellOutput {
            success,
            stdout: Some(stdout.to_string()),
        };
        self.responses.insert(command.to_string(), output);
        self
    }

    /// A shell on which `id` succeeds and `-v` prints `banner`.
    pub fn rooted(banner: &str) -> Self {
        Self::new().respond("id", true, "uid=0(root)").with_banner(banner)
    }

    pub fn with_banner(mut self, banner: &str) -> Self {
        self.banner = Some(banner.to_string());
        self
    }

    /// Batches stop reporting at `index` and come back timed out.
    pub fn stall_batches_at(mut self, index: usize) -> Self {
        self.stall_at = Some(index);
        self
    }

    pub fn exec_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl ShellExecutor for ScriptedShell {
    fn exec(&self, command: &str) -> ShellOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        self.responses
            .get(command)
            .cloned()
            .unwrap_or_else(ShellOutput::failed)
    }

    fn version_banner(&self) -> Option<String> {
        self.banner.clone()
    }

    fn exec_batch(
        &self,
        commands: &[String],
        _timeout: Duration,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BatchOutcome {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(commands.to_vec());
        }
        if commands.is_empty() {
            return BatchOutcome::Empty;
        }

        let total = commands.len();
        let mut last_reported = None;
        for index in 0..total {
            if self.stall_at == Some(index) {
                return BatchOutcome::TimedOut { last_reported };
            }
            if should_report(index, total) {
                on_progress(index, total);
                last_reported = Some(index);
            }
        }
        BatchOutcome::Completed { exit_code: Some(0) }
    }
}

// ============================================================================
// Platform fakes
// ============================================================================

/// Platform whose every answer is a public field.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    pub memory: Option<MemoryInfo>,
    pub storage: Option<StorageInfo>,
    pub battery: Option<BatteryReading>,
    pub network: NetworkInfo,
    pub display: DisplayInfo,
    pub camera: CameraInfo,
    pub features: FeatureSet,
    pub thermal_status: Option<i64>,
    pub uptime_ms: Option<u64>,
    pub kernel_release: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
}

impl PlatformSource for FakePlatform {
    fn memory(&self) -> Option<MemoryInfo> {
        self.memory
    }

    fn storage(&self) -> Option<StorageInfo> {
        self.storage
    }

    fn battery(&self) -> Option<BatteryReading> {
        self.battery.clone()
    }

    fn network(&self) -> NetworkInfo {
        self.network.clone()
    }

    fn display(&self) -> DisplayInfo {
        self.display.clone()
    }

    fn camera(&self) -> CameraInfo {
        self.camera.clone()
    }

    fn features(&self) -> FeatureSet {
        self.features.clone()
    }

    fn thermal_status(&self) -> Option<i64> {
        self.thermal_status
    }

    fn uptime_ms(&self) -> Option<u64> {
        self.uptime_ms
    }

    fn kernel_release(&self) -> Option<String> {
        self.kernel_release.clone()
    }

    fn timezone(&self) -> Option<String> {
        self.timezone.clone()
    }

    fn language(&self) -> Option<String> {
        self.language.clone()
    }
}

/// DRM plugin for one scheme with scripted properties.
#[derive(Debug, Clone)]
pub struct FakeDrm {
    scheme: Uuid,
    properties: BTreeMap<String, Option<String>>,
}

impl FakeDrm {
    pub fn widevine() -> Self {
        Self {
            scheme: WIDEVINE_UUID,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.properties
            .insert(name.to_string(), Some(value.to_string()));
        self
    }

    /// Querying `name` raises an error.
    pub fn failing(mut self, name: &str) -> Self {
        self.properties.insert(name.to_string(), None);
        self
    }
}

impl DrmProvider for FakeDrm {
    fn property(&self, scheme: Uuid, name: &str) -> Result<Option<String>, DrmError> {
        if scheme != self.scheme {
            return Err(DrmError::UnsupportedScheme(scheme));
        }
        match self.properties.get(name) {
            Some(Some(value)) => Ok(Some(value.clone())),
            Some(None) => Err(DrmError::Property {
                property: name.to_string(),
                reason: "scripted failure".to_string(),
            }),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Progress capture
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// `(step, total)` of every event, in order.
    pub fn steps(&self) -> Vec<(usize, usize)> {
        self.events().iter().map(|e| (e.step, e.total)).collect()
    }
}

impl ProgressEmitter for RecordingEmitter {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
