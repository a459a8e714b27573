//! Core BLE library for BM6 battery monitors.
//!
//! This crate provides Bluetooth Low Energy (BLE) communication with BM6
//! 12 V battery monitors: discovering them and taking a single
//! voltage/temperature reading.
//!
//! # Features
//!
//! - **Device discovery**: Scan for nearby monitors advertising as `BM6`
//! - **Readings**: Battery voltage (V, hundredths resolution) and temperature (°C)
//! - **Frame cipher**: AES-128-CBC codec for the monitor's encrypted frames
//! - **Cancellable sessions**: Bounded waits, cancellation, guaranteed teardown
//! - **Mock transport**: Drive sessions in tests without hardware
//!
//! # Platform Differences
//!
//! - **macOS**: Devices are identified by a UUID assigned by CoreBluetooth.
//!   The UUID is stable for a given device on a given Mac, but is not the
//!   device's MAC address.
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use bm6_core::{BleTransport, SessionConfig, read_reading, scan};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BleTransport::new().await?;
//!
//!     let devices = scan::scan(&transport, &scan::ScanOptions::default()).await?;
//!     println!("Found {} devices", devices.len());
//!
//!     if let Some(device) = devices.first() {
//!         let reading = read_reading(
//!             &transport,
//!             &device.address,
//!             SessionConfig::default(),
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!         println!("{:.2} V, {} °C", reading.voltage, reading.temperature);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod cipher;
pub mod error;
pub mod mock;
pub mod scan;
pub mod session;
pub mod transport;

// Re-export types and uuid modules from bm6-types
pub use bm6_types::protocol;
pub use bm6_types::types;
pub use bm6_types::uuid;

// Core exports
pub use ble::{BleConnection, BleTransport};
pub use cipher::CipherError;
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use scan::{ScanOptions, scan_for_devices};
pub use session::{Session, SessionConfig, SessionState, handle_notification, read_reading};
pub use transport::{Advertisement, Connection, NotificationHandler, Transport, WriteMode};

pub use mock::{MockCall, MockConnection, MockTransport, MockTransportBuilder};

// Re-export from bm6-types
pub use bm6_types::uuid as uuids;
pub use bm6_types::{DeviceAddress, ParseError, Reading, ScanResult};
