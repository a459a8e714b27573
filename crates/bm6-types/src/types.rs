//! Core types for BM6 battery monitor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::protocol::{
    MIN_READING_FRAME_LEN, RESPONSE_MAGIC, TEMPERATURE_OFFSET, VOLTAGE_HIGH_OFFSET, VOLTAGE_SCALE,
    has_reading_prefix,
};

/// Identifier used to target a BM6 connection.
///
/// On Linux and Windows this is the Bluetooth MAC address
/// (e.g., `AA:BB:CC:DD:EE:FF`). On macOS it is the UUID assigned by
/// CoreBluetooth. No structure is assumed beyond equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Create an address from its string form.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against another identifier, ignoring case and `:` separators.
    ///
    /// Useful when users type MAC addresses in a different style than the
    /// Bluetooth stack reports them.
    pub fn matches(&self, other: &str) -> bool {
        fn normalize(s: &str) -> String {
            s.chars()
                .filter(|c| *c != ':' && *c != '-')
                .map(|c| c.to_ascii_lowercase())
                .collect()
        }
        normalize(&self.0) == normalize(other)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for DeviceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A BM6 monitor seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanResult {
    /// Address to pass to a session.
    pub address: DeviceAddress,
    /// Signal strength of the advertisement in dBm.
    pub rssi: i16,
}

impl ScanResult {
    /// Create a new scan result.
    pub fn new(address: impl Into<DeviceAddress>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            rssi,
        }
    }
}

/// Voltage and temperature reported by a BM6 monitor.
///
/// Both fields always come from the same frame; there is no way to build
/// a partially populated reading from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Battery voltage in volts (two-decimal precision).
    pub voltage: f64,
    /// Temperature in whole degrees Celsius. The monitor does not report
    /// values below zero.
    pub temperature: u8,
}

impl Reading {
    /// Parse a `Reading` from a decrypted voltage/temperature frame.
    ///
    /// The frame must start with [`RESPONSE_MAGIC`] and contain at least
    /// [`MIN_READING_FRAME_LEN`] bytes. The voltage is the 12-bit value
    /// formed by the low nibble of byte 7 and all of byte 8, in hundredths
    /// of a volt; the temperature is byte 4.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnexpectedPrefix`] for frames with another
    /// opcode and [`ParseError::InsufficientBytes`] for truncated frames.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_frame(frame: &[u8]) -> ParseResult<Self> {
        use bytes::Buf;

        if !has_reading_prefix(frame) {
            let end = frame.len().min(RESPONSE_MAGIC.len());
            return Err(ParseError::UnexpectedPrefix {
                found: hex::encode(&frame[..end]),
            });
        }

        if frame.len() < MIN_READING_FRAME_LEN {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_READING_FRAME_LEN,
                actual: frame.len(),
            });
        }

        let mut buf = &frame[TEMPERATURE_OFFSET..];
        let temperature = buf.get_u8();

        let mut buf = &frame[VOLTAGE_HIGH_OFFSET..];
        let raw_voltage = buf.get_u16() & 0x0FFF;

        Ok(Self {
            voltage: f64::from(raw_voltage) / VOLTAGE_SCALE,
            temperature,
        })
    }

    /// Voltage in hundredths of a volt, as transmitted.
    pub fn raw_voltage(&self) -> u16 {
        (self.voltage * VOLTAGE_SCALE).round() as u16
    }
}
