//! Example: Reading a BM6 Battery Monitor
//!
//! Connects to one monitor, takes a single voltage/temperature reading and
//! disconnects. Press Ctrl-C to abandon the wait; the connection is still
//! closed.
//!
//! Run with: `cargo run --example read_battery -- AA:BB:CC:DD:EE:FF`

use std::time::Duration;

use bm6_core::{BleTransport, SessionConfig, read_reading};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let Some(address) = std::env::args().nth(1) else {
        eprintln!("Usage: read_battery <address>");
        std::process::exit(2);
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let transport = BleTransport::new().await?;
    let config = SessionConfig::default().read_timeout(Some(Duration::from_secs(20)));

    println!("Reading {}...", address);
    let reading = read_reading(&transport, &address.into(), config, &cancel).await?;

    println!("Voltage:     {:.2} V", reading.voltage);
    println!("Temperature: {} °C", reading.temperature);

    Ok(())
}
