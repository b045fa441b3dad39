// qti-session-cli/tests/config_command.rs
// ============================================================================
// Module: CLI Config Command Tests
// Description: Integration tests for `qti-session config validate`.
// Purpose: Exercise config file loading through the CLI binary.
// Dependencies: qti-session-cli binary
// ============================================================================

//! CLI `config validate` command integration tests.

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

/// Verifies a well-formed config file is accepted and its resolved flags
/// are printed.
#[test]
fn config_validate_accepts_a_well_formed_file() {
    let root = temp_root("config-validate-ok");
    let config_path = root.join("engine.toml");
    fs::write(&config_path, "path_tracking = true\nalways_allow_jumps = true\n").expect("write config");

    let output = Command::new(qti_session_bin())
        .args(["config", "validate", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("validate config");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("path_tracking: true"), "unexpected stdout: {stdout}");

    cleanup(&root);
}

/// Verifies a malformed config file is rejected with a nonzero exit code.
#[test]
fn config_validate_rejects_malformed_toml() {
    let root = temp_root("config-validate-bad");
    let config_path = root.join("engine.toml");
    fs::write(&config_path, "not valid toml = [").expect("write config");

    let output = Command::new(qti_session_bin())
        .args(["config", "validate", "--config", config_path.to_string_lossy().as_ref()])
        .output()
        .expect("validate config");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validating config"), "unexpected stderr: {stderr}");

    cleanup(&root);
}
