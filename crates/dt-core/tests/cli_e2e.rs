//! End-to-end CLI tests for dt-core.
//!
//! Every test runs against a temporary device tree (`--fs-root`), a
//! temporary store and `sh` standing in for `su`.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Device {
    root: TempDir,
    state: TempDir,
}

impl Device {
    fn new() -> Self {
        let device = Self {
            root: TempDir::new().expect("device root"),
            state: TempDir::new().expect("state dir"),
        };
        device.seed("proc/sys/vm/swappiness", "100\n");
        device.seed("proc/sys/net/ipv4/tcp_congestion_control", "cubic\n");
        device.seed("proc/version", "Linux version 5.10.198-android12-9 (build@host)\n");
        device.seed(
            "build.prop",
            "ro.product.model=Pixel 7\nro.product.manufacturer=Google\nro.build.version.release=14\nro.build.version.sdk=34\n",
        );
        let settings = format!(
            r#"{{ "props_file": "{}" }}"#,
            device.root.path().join("build.prop").display()
        );
        std::fs::write(device.settings(), settings).expect("settings");
        device
    }

    fn seed(&self, rel: &str, content: &str) {
        let path = self.root.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn node(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root.path().join(rel)).unwrap()
    }

    fn settings(&self) -> PathBuf {
        self.state.path().join("settings.json")
    }

    fn store(&self) -> PathBuf {
        self.state.path().join("tweaks.json")
    }

    fn store_json(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.store()).unwrap()).unwrap()
    }

    fn cmd(&self) -> Command {
        self.cmd_with_shell("sh")
    }

    fn cmd_with_shell(&self, shell: &str) -> Command {
        let mut cmd = Command::cargo_bin("dt-core").expect("dt-core binary should exist");
        cmd.env("DT_SHELL", shell)
            .env_remove("DT_SETTINGS")
            .env_remove("DT_STORE")
            .env_remove("DT_FS_ROOT")
            .arg("--settings")
            .arg(self.settings())
            .arg("--store")
            .arg(self.store())
            .arg("--fs-root")
            .arg(self.root.path());
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn store_entry<'a>(store: &'a Value, key: &str) -> Option<&'a Value> {
    store.get("entries").and_then(|e| e.get(key)).or_else(|| store.get(key))
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test]
fn version_is_json() {
    let output = Command::cargo_bin("dt-core").unwrap().arg("version").output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert!(json["dt_core_version"].is_string());
    assert!(json["schema_version"].is_string());
}

#[test]
fn completions_generate() {
    Command::cargo_bin("dt-core")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dt-core"));
}

#[test]
fn root_detected_through_shell() {
    let device = Device::new();
    let output = device.cmd().arg("root").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["is_rooted"], true);
}

#[test]
fn missing_shell_means_no_root() {
    let device = Device::new();
    device
        .cmd_with_shell("/nonexistent/dt-su")
        .args(["apply"])
        .assert()
        .code(11)
        .stdout(predicate::str::contains("\"exit_code\": 11"));
}

#[test]
fn tunables_set_writes_node_and_persists() {
    let device = Device::new();
    device
        .cmd()
        .args(["tunables", "set", "saved_swappiness", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved_swappiness"));

    assert_eq!(device.node("proc/sys/vm/swappiness"), "60\n");
    let store = device.store_json();
    assert!(store_entry(&store, "saved_swappiness").is_some(), "{store}");
}

#[test]
fn tunables_set_unknown_key_is_an_argument_error() {
    let device = Device::new();
    device
        .cmd()
        .args(["tunables", "set", "saved_warp_drive", "1"])
        .assert()
        .code(10);
    assert!(!exists(&device.store()));
}

#[test]
fn tunables_unset_reports_removal() {
    let device = Device::new();
    device.cmd().args(["tunables", "set", "saved_tcp", "bbr"]).assert().success();

    let output = device.cmd().args(["tunables", "unset", "saved_tcp"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["removed"], true);

    let output = device.cmd().args(["tunables", "unset", "saved_tcp"]).output().unwrap();
    assert_eq!(stdout_json(&output)["removed"], false);
}

#[test]
fn tunables_list_shows_saved_and_live() {
    let device = Device::new();
    device.cmd().args(["tunables", "set", "saved_swappiness", "42"]).assert().success();

    let output = device.cmd().args(["tunables", "list"]).output().unwrap();
    assert!(output.status.success());
    let list = stdout_json(&output);
    let swappiness = list
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["key"] == "saved_swappiness")
        .unwrap();
    assert_eq!(swappiness["saved"], "42");
    assert_eq!(swappiness["live"]["value"], "42");
}

#[test]
fn apply_with_empty_store_is_clean() {
    let device = Device::new();
    let output = device.cmd().arg("apply").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["total"], 0);
}

#[test]
fn apply_runs_saved_batch() {
    let device = Device::new();
    device.cmd().args(["tunables", "set", "saved_swappiness", "60"]).assert().success();
    device.cmd().args(["tunables", "set", "saved_tcp", "bbr"]).assert().success();
    device.seed("proc/sys/vm/swappiness", "100\n");
    device.seed("proc/sys/net/ipv4/tcp_congestion_control", "cubic\n");

    let output = device.cmd().arg("apply").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let report = stdout_json(&output);
    assert_eq!(report["total"], 2);
    assert_eq!(report["status"], "Optimizations Active & Protected");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Optimizations Active & Protected"), "{stderr}");

    assert_eq!(device.node("proc/sys/vm/swappiness"), "60\n");
    assert_eq!(device.node("proc/sys/net/ipv4/tcp_congestion_control"), "bbr\n");
}

#[test]
fn boot_respects_run_on_boot() {
    let device = Device::new();
    device.cmd().args(["tunables", "set", "saved_swappiness", "60"]).assert().success();
    device.seed("proc/sys/vm/swappiness", "100\n");

    let output = device.cmd().arg("boot").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["ran"], false);
    assert_eq!(device.node("proc/sys/vm/swappiness"), "100\n");

    device.cmd().args(["store", "run-on-boot", "on"]).assert().success();
    let output = device.cmd().arg("boot").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout_json(&output)["ran"], true);
    assert_eq!(device.node("proc/sys/vm/swappiness"), "60\n");
}

#[test]
fn service_stop_clears_running_flag() {
    let device = Device::new();
    device.cmd().args(["tunables", "set", "saved_swappiness", "60"]).assert().success();
    device.cmd().arg("apply").assert().code(2);

    let output = device.cmd().args(["service", "status"]).output().unwrap();
    assert_eq!(stdout_json(&output)["service_running"], true);

    let output = device.cmd().args(["service", "stop"]).output().unwrap();
    assert_eq!(stdout_json(&output)["service_running"], false);
}

#[test]
fn static_snapshot_reads_fixture_tree() {
    let device = Device::new();
    let output = device.cmd().args(["snapshot", "static"]).output().unwrap();
    assert!(output.status.success());
    let snapshot = stdout_json(&output);
    assert_eq!(snapshot["identity"]["model"], "Pixel 7");
    assert_eq!(snapshot["identity"]["manufacturer"], "Google");
    assert_eq!(snapshot["root"]["is_rooted"], true);
    assert!(snapshot["schema_version"].is_string());
}

#[test]
fn dynamic_snapshot_streams_ticks() {
    let device = Device::new();
    let output = device
        .cmd()
        .args(["--format", "jsonl", "snapshot", "dynamic", "--count", "2", "--interval-ms", "50"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let lines: Vec<&str> = std::str::from_utf8(&output.stdout).unwrap().lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let tick: Value = serde_json::from_str(line).unwrap();
        assert!(tick["battery"].is_object());
    }
}

#[test]
fn config_schema_describes_settings() {
    let device = Device::new();
    device
        .cmd()
        .args(["config", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("batch_timeout_secs"));
}

#[test]
fn summary_errors_go_to_stderr() {
    let device = Device::new();
    device
        .cmd()
        .args(["--format", "summary", "tunables", "unset", "saved_nothing"])
        .assert()
        .code(10)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("saved_nothing"));
}
