//! Hardware integration tests for bm6-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package bm6-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the monitor via environment variable:
//! - `BM6_DEVICE`: address of a BM6 monitor in range
//!
//! Example:
//! ```
//! BM6_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package bm6-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use bm6_core::scan::{ScanOptions, scan};
use bm6_core::{BleTransport, Error, SessionConfig, read_reading};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Get device address from environment
fn get_device() -> Option<String> {
    env::var("BM6_DEVICE").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let transport = BleTransport::new().await.expect("no Bluetooth adapter");
    let options = ScanOptions::default().duration_secs(10);

    let devices = timeout(BLE_TIMEOUT, scan(&transport, &options))
        .await
        .expect("scan timed out")
        .expect("scan failed");

    println!("Scan discovered {} devices:", devices.len());
    for device in &devices {
        println!("  - {} ({} dBm)", device.address, device.rssi);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_finds_configured_device() {
    let Some(address) = get_device() else {
        println!("Skipping: BM6_DEVICE not set");
        return;
    };

    let transport = BleTransport::new().await.expect("no Bluetooth adapter");
    let devices = scan(&transport, &ScanOptions::default().duration_secs(10))
        .await
        .expect("scan failed");

    assert!(
        devices.iter().any(|d| d.address.matches(&address)),
        "{} not found among {:?}",
        address,
        devices
    );
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_read_reading() {
    let Some(address) = get_device() else {
        println!("Skipping: BM6_DEVICE not set");
        return;
    };

    let transport = BleTransport::new().await.expect("no Bluetooth adapter");
    let reading = read_reading(
        &transport,
        &address.into(),
        SessionConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .expect("read failed");

    println!("Voltage: {:.2}", reading.voltage);
    println!("Temperature: {}", reading.temperature);

    // A 12 V system never reads outside this band while the monitor is powered.
    assert!((5.0..=20.0).contains(&reading.voltage));
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_cancel_before_reading() {
    let Some(address) = get_device() else {
        println!("Skipping: BM6_DEVICE not set");
        return;
    };

    let transport = BleTransport::new().await.expect("no Bluetooth adapter");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = read_reading(
        &transport,
        &address.into(),
        SessionConfig::default(),
        &cancel,
    )
    .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_unknown_address_fails_to_connect() {
    let transport = BleTransport::new().await.expect("no Bluetooth adapter");
    let config = SessionConfig::default().connection_timeout(Duration::from_secs(5));

    let result = read_reading(
        &transport,
        &"00:11:22:33:44:55".into(),
        config,
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
}
