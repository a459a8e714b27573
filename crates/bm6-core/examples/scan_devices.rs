//! Example: Scanning for BM6 Battery Monitors
//!
//! This example listens for BLE advertisements and lists every monitor
//! advertising as `BM6`, with its signal strength.
//!
//! Run with: `cargo run --example scan_devices`

use bm6_core::BleTransport;
use bm6_core::scan::{self, ScanOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Scanning for BM6 monitors...");
    println!();

    let transport = BleTransport::new().await?;
    let options = ScanOptions::default().duration_secs(10);
    let devices = scan::scan(&transport, &options).await?;

    if devices.is_empty() {
        println!("No BM6 devices found.");
        println!();
        println!("Make sure:");
        println!("  - The monitor is wired to a battery");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The monitor is within range");
    } else {
        println!("Found {} device(s):", devices.len());
        println!();

        for device in &devices {
            println!("  {}", device.address);
            println!("    RSSI: {} dBm", device.rssi);
            println!();
        }
    }

    Ok(())
}
