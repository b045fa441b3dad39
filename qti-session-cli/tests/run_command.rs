// qti-session-cli/tests/run_command.rs
// ============================================================================
// Module: CLI Run Command Tests
// Description: Integration tests for `qti-session run` against a fixture
//              and script, including snapshot persistence and resumption.
// Purpose: Exercise the CLI binary end to end, not just its library pieces.
// Dependencies: qti-session-cli binary, serde_json
// ============================================================================

//! CLI `run` command integration tests.

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

// ============================================================================
// SECTION: Helpers
// ============================================================================

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
        "outcomeDeclarations": [
            { "identifier": "SCORE", "kind": "outcome", "cardinality": "single", "baseType": "integer" }
        ],
        "testParts": [
            { "identifier": "P1", "navigationMode": "linear", "submissionMode": "individual" }
        ],
        "itemRefs": [
            {
                "identifier": "Q1",
                "responseDeclarations": [
                    { "identifier": "RESPONSE", "kind": "response", "cardinality": "single", "baseType": "identifier" }
                ],
                "outcomeDeclarations": [
                    { "identifier": "SCORE", "kind": "outcome", "cardinality": "single", "baseType": "integer" }
                ],
                "responseProcessing": "scoreResponse(RESPONSE,CORRECT,SCORE)"
            }
        ],
        "outcomeProcessing": "sumOutcome(SCORE)"
    },
    "route": [
        { "itemRef": "Q1", "testPart": "P1" }
    ]
}"#;

const SCRIPT: &str = r#"{
    "actions": [
        { "action": "beginTestSession" },
        { "action": "beginAttempt" },
        {
            "action": "endAttempt",
            "responses": {
                "RESPONSE": { "cardinality": "single", "baseType": "identifier", "value": "CORRECT" }
            }
        },
        { "action": "get", "identifier": "SCORE" },
        { "action": "endTestSession" }
    ]
}"#;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies `run` drives a full session to `Closed` and prints the scored
/// outcome along the way.
#[test]
fn run_drives_a_session_to_closed() {
    let root = temp_root("run-basic");
    let fixture_path = root.join("fixture.json");
    let script_path = root.join("script.json");
    fs::write(&fixture_path, FIXTURE).expect("write fixture");
    fs::write(&script_path, SCRIPT).expect("write script");

    let output = Command::new(qti_session_bin())
        .args([
            "run",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--script",
            script_path.to_string_lossy().as_ref(),
        ])
        .output()
        .expect("run session");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SCORE = "), "unexpected stdout: {stdout}");
    assert!(stdout.contains("state Closed"), "unexpected stdout: {stdout}");

    cleanup(&root);
}

/// Verifies a snapshot persisted by one `run` invocation can be resumed by
/// a second invocation that continues past where the first left off.
#[test]
fn run_persists_and_resumes_a_snapshot() {
    let root = temp_root("run-snapshot");
    let fixture_path = root.join("fixture.json");
    let snapshot_dir = root.join("snapshots");
    fs::write(&fixture_path, FIXTURE).expect("write fixture");

    let first_script = root.join("first.json");
    fs::write(
        &first_script,
        r#"{ "actions": [ { "action": "beginTestSession" }, { "action": "beginAttempt" } ] }"#,
    )
    .expect("write first script");

    let first = Command::new(qti_session_bin())
        .args([
            "run",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--script",
            first_script.to_string_lossy().as_ref(),
            "--snapshot-dir",
            snapshot_dir.to_string_lossy().as_ref(),
            "--session-id",
            "resume-me",
        ])
        .output()
        .expect("run first half");
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    assert!(snapshot_dir.join("resume-me.qtisession").exists());

    let second_script = root.join("second.json");
    fs::write(
        &second_script,
        r#"{
            "actions": [
                {
                    "action": "endAttempt",
                    "responses": {
                        "RESPONSE": { "cardinality": "single", "baseType": "identifier", "value": "WRONG" }
                    }
                },
                { "action": "endTestSession" }
            ]
        }"#,
    )
    .expect("write second script");

    let second = Command::new(qti_session_bin())
        .args([
            "run",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--script",
            second_script.to_string_lossy().as_ref(),
            "--snapshot-dir",
            snapshot_dir.to_string_lossy().as_ref(),
            "--session-id",
            "resume-me",
        ])
        .output()
        .expect("run second half");
    assert!(second.status.success(), "stderr: {}", String::from_utf8_lossy(&second.stderr));
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("state Closed"), "unexpected stdout: {stdout}");

    cleanup(&root);
}

/// Verifies a malformed fixture file is reported on stderr with a nonzero
/// exit code rather than panicking.
#[test]
fn run_rejects_a_malformed_fixture() {
    let root = temp_root("run-bad-fixture");
    let fixture_path = root.join("fixture.json");
    let script_path = root.join("script.json");
    fs::write(&fixture_path, "{ not json").expect("write fixture");
    fs::write(&script_path, SCRIPT).expect("write script");

    let output = Command::new(qti_session_bin())
        .args([
            "run",
            "--fixture",
            fixture_path.to_string_lossy().as_ref(),
            "--script",
            script_path.to_string_lossy().as_ref(),
        ])
        .output()
        .expect("run session");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fixture"), "unexpected stderr: {stderr}");

    cleanup(&root);
}
