// qti-session-cli/tests/snapshot_command.rs
// ============================================================================
// Module: CLI Snapshot Command Tests
// Description: Integration tests for `qti-session snapshot inspect`.
// Purpose: Exercise the snapshot decode-and-report path against a snapshot
//          produced by a prior `run` invocation.
// Dependencies: qti-session-cli binary
// ============================================================================

//! CLI `snapshot inspect` command integration tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

fn qti_session_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_qti-session"))
}

fn temp_root(label: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock drift").as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("qti-session-cli-{label}-{nanos}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn cleanup(path: &Path) {
    let _ = fs::remove_dir_all(path);
}

const FIXTURE: &str = r#"{
    "test": {
        "identifier": "T1",
        "testParts": [
            { "identifier": "P1", "navigationMode": "linear", "submissionMode": "individual" }
        ],
        "itemRefs": [
            { "identifier": "Q1" }
        ]
    },
    "route": [
        { "itemRef": "Q1", "testPart": "P1" }
    ]
}"#;

/// Verifies `snapshot inspect` reports the state and position a prior `run`
/// persisted.
#[test]
fn snapshot_inspect_reports_a_persisted_session() {
    let root = temp_root("snapshot-inspect");
    let fixture_path = root.join("fixture.json");
    let snapshot_dir = root.join("snapshots");
    fs::write(&fixture_path, FIXTURE).expect("write fixture");

    let script_path = root.join("script.json");
    fs::write(&script_path, r#"{ "actions": [ { "action": "beginTestSession" } ] }"#).expect("write script");

    let run = Command::new(qti_session_bin())
        .args([
            "run",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--script",
            script_path.to_string_lossy().as_ref(),
            "--snapshot-dir",
            snapshot_dir.to_string_lossy().as_ref(),
            "--session-id",
            "inspect-me",
        ])
        .output()
        .expect("run session");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));

    let inspect = Command::new(qti_session_bin())
        .args([
            "snapshot",
            "inspect",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--snapshot-dir",
            snapshot_dir.to_string_lossy().as_ref(),
            "--session-id",
            "inspect-me",
        ])
        .output()
        .expect("inspect snapshot");

    assert!(inspect.status.success(), "stderr: {}", String::from_utf8_lossy(&inspect.stderr));
    let stdout = String::from_utf8_lossy(&inspect.stdout);
    assert!(stdout.contains("state Interacting"), "unexpected stdout: {stdout}");
    assert!(stdout.contains("position 0/1"), "unexpected stdout: {stdout}");

    cleanup(&root);
}

/// Verifies inspecting a session id with no persisted snapshot fails
/// cleanly rather than panicking.
#[test]
fn snapshot_inspect_reports_missing_sessions() {
    let root = temp_root("snapshot-inspect-missing");
    let fixture_path = root.join("fixture.json");
    let snapshot_dir = root.join("snapshots");
    fs::write(&fixture_path, FIXTURE).expect("write fixture");
    fs::create_dir_all(&snapshot_dir).expect("create snapshot dir");

    let inspect = Command::new(qti_session_bin())
        .args([
            "snapshot",
            "inspect",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--snapshot-dir",
            snapshot_dir.to_string_lossy().as_ref(),
            "--session-id",
            "never-ran",
        ])
        .output()
        .expect("inspect snapshot");

    assert!(!inspect.status.success());
    let stderr = String::from_utf8_lossy(&inspect.stderr);
    assert!(stderr.contains("no snapshot found"), "unexpected stderr: {stderr}");

    cleanup(&root);
}
