//! Platform-agnostic types for BM6 battery monitors.
//!
//! This crate provides the data model and wire constants shared by the
//! BLE implementation (bm6-core) and any other consumer that only needs
//! to interpret decrypted frames.
//!
//! # Features
//!
//! - Reading and scan result types
//! - Frame layout constants and the reading parser
//! - UUID constants for BLE characteristics
//! - Error types for frame parsing
//!
//! # Example
//!
//! ```
//! use bm6_types::Reading;
//!
//! let frame = [
//!     0xd1, 0x55, 0x07, 0x00, 0x19, 0x00, 0x00, 0x04, //
//!     0xe2, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
//! ];
//! let reading = Reading::from_frame(&frame).unwrap();
//! assert_eq!(reading.temperature, 25);
//! assert_eq!(reading.raw_voltage(), 1250);
//! ```

pub mod error;
pub mod protocol;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{DeviceAddress, Reading, ScanResult};
pub use uuid as uuids;
