//! CLI Integration Tests
//!
//! These tests verify the CLI binary's argument handling and output.
//! Tests that need a monitor in range are marked with #[ignore].
//!
//! Run mock tests:
//! ```
//! cargo test --package bm6-cli --test cli_integration
//! ```
//!
//! Run hardware tests:
//! ```
//! BM6_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package bm6-cli --test cli_integration -- --ignored --nocapture
//! ```

use std::env;
use std::process::Command;

/// Run the bm6 binary and return its output
fn run_bm6(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_bm6"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run bm6 binary")
}

/// Get device from environment
fn get_device() -> Option<String> {
    env::var("BM6_DEVICE").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Help and Version Tests (no hardware required)
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_bm6(&["--help"]);

    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--scan"), "Help should list --scan");
    assert!(stdout.contains("--address"), "Help should list --address");
    assert!(stdout.contains("--format"), "Help should list --format");
}

#[test]
fn test_version_command() {
    let output = run_bm6(&["--version"]);

    assert!(output.status.success(), "Version should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bm6"), "Version should contain bm6");
}

// =============================================================================
// Argument Validation (no hardware required)
// =============================================================================

#[test]
fn test_requires_scan_or_address() {
    let output = run_bm6(&[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--scan") || stderr.contains("--address"));
}

#[test]
fn test_scan_and_address_are_exclusive() {
    let output = run_bm6(&["--scan", "--address", "AA:BB:CC:DD:EE:FF"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot be used with"));
}

#[test]
fn test_rejects_unknown_format() {
    let output = run_bm6(&["--scan", "--format", "csv"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ascii") && stderr.contains("json"));
}

// =============================================================================
// Hardware Tests
// =============================================================================

#[test]
#[ignore = "requires BLE hardware"]
fn test_scan_ascii() {
    let output = run_bm6(&["--scan"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("Address           RSSI") || stdout.starts_with("No BM6 devices found."),
        "Unexpected scan output: {}",
        stdout
    );
}

#[test]
#[ignore = "requires BLE hardware"]
fn test_scan_json() {
    let output = run_bm6(&["--scan", "--format", "json"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("scan output is JSON");
    assert!(value.is_array());
}

#[test]
#[ignore = "requires BLE hardware"]
fn test_read_ascii() {
    let Some(device) = get_device() else {
        println!("Skipping: BM6_DEVICE not set");
        return;
    };

    let output = run_bm6(&["--address", &device]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Voltage: "));
    assert!(lines[1].starts_with("Temperature: "));
}

#[test]
#[ignore = "requires BLE hardware"]
fn test_read_unknown_address_fails() {
    let output = run_bm6(&["--address", "00:11:22:33:44:55", "--timeout", "5"]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("00:11:22:33:44:55"));
}
