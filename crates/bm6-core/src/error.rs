//! Error types for bm6-core.
//!
//! This module defines all error types that can occur when scanning for or
//! talking to BM6 monitors via Bluetooth Low Energy.
//!
//! # Which errors end a session
//!
//! | Error Type | Raised when | Session outcome |
//! |------------|-------------|-----------------|
//! | [`Error::ConnectionFailed`] | Device unreachable or 30 s connect timeout | Failed, nothing to tear down |
//! | [`Error::ConnectionFailed`] (`Lost`) | Link dropped mid-session | Failed, teardown attempted |
//! | [`Error::WriteFailed`] | Command write not acknowledged | Failed, teardown attempted |
//! | [`Error::SubscriptionFailed`] | Notification registration rejected | Failed, teardown attempted |
//! | [`Error::ReadTimeout`] | Device reachable but no matching frame arrived | Failed, teardown attempted |
//! | [`Error::Cancelled`] | Caller cancelled the wait | Failed, teardown attempted |
//! | [`Error::Scan`] | Adapter refused to start scanning | Logged; scan reports no devices |
//!
//! Frames that fail to decrypt or parse never surface here; the session
//! discards them and keeps waiting.
//!
//! "No BM6 devices found" is an empty scan result, not an error.

use std::time::Duration;

use thiserror::Error;

use crate::cipher::CipherError;

/// Errors that can occur when communicating with BM6 devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// The adapter could not start a scan.
    #[error("Scan failed: {0}")]
    Scan(String),

    /// Connection failed with specific reason.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// The device address that failed to connect.
        address: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The characteristic alias or UUID that was not found.
        uuid: String,
    },

    /// Write operation was not acknowledged.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic alias or UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Notification registration failed.
    #[error("Subscription failed on characteristic {uuid}: {reason}")]
    SubscriptionFailed {
        /// The characteristic alias or UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The device stayed connected but sent no matching frame in time.
    #[error("No reading received within {duration:?}")]
    ReadTimeout {
        /// How long the session waited.
        duration: Duration,
    },

    /// A transport operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Frame cipher rejected its input.
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// A session step was called out of order.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Device is out of range or not advertising.
    OutOfRange,
    /// Connection attempt timed out.
    Timeout(Duration),
    /// The connection dropped during the session.
    Lost,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Timeout(duration) => write!(f, "connection timed out after {:?}", duration),
            Self::Lost => write!(f, "connection lost"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason,
        }
    }

    /// Create a write failure.
    pub fn write_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Create a subscription failure.
    pub fn subscription_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Nothing in this crate retries on its own; callers can use this to
    /// decide whether to run another session.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::ReadTimeout { .. } => true,
            Error::Bluetooth(_) => true,
            Error::ConnectionFailed { .. } => true,
            Error::WriteFailed { .. } | Error::SubscriptionFailed { .. } => true,
            Error::Scan(_) => true,
            Error::DeviceNotFound(_) => false,
            Error::CharacteristicNotFound { .. } => false,
            Error::Cancelled => false,
            Error::Cipher(_) | Error::InvalidState(_) => false,
        }
    }
}

/// Result type alias using bm6-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
