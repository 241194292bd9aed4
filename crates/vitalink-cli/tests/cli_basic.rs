//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify they parse and
//! exit cleanly. Commands that need the NLP or delivery services are
//! exercised through --help only.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "vitalink-cli", "--"])
        .args(args)
        .env("VITALINK_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_help() {
    let (stdout, _, code) = run_cli(&["--help"]);
    assert_eq!(code, 0, "top-level help failed");
    assert!(stdout.contains("Vitalink CLI"));
}

#[test]
fn test_patient_help() {
    let (stdout, _, code) = run_cli(&["patient", "--help"]);
    assert_eq!(code, 0, "patient help failed");
    assert!(stdout.contains("add"));
    assert!(stdout.contains("summary"));
}

#[test]
fn test_inbound_help() {
    let (stdout, _, code) = run_cli(&["inbound", "--help"]);
    assert_eq!(code, 0, "inbound help failed");
    assert!(stdout.contains("handle"));
}

#[test]
fn test_dispatch_help() {
    let (stdout, _, code) = run_cli(&["dispatch", "--help"]);
    assert_eq!(code, 0, "dispatch help failed");
    assert!(stdout.contains("run"));
    assert!(stdout.contains("remind"));
}

#[test]
fn test_config_list() {
    let (stdout, _, code) = run_cli(&["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    assert!(stdout.contains("dispatch"));
}

#[test]
fn test_config_get() {
    let (stdout, _, code) = run_cli(&["config", "get", "dispatch.batch_limit"]);
    assert_eq!(code, 0, "config get failed");
    assert!(stdout.trim().parse::<u32>().is_ok());
}

#[test]
fn test_unknown_plan_is_rejected() {
    let (_, stderr, code) = run_cli(&["patient", "add", "+5511900000000", "Test", "--plan", "gold"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown plan tier"));
}
