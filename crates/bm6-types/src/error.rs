//! Error types for frame parsing in bm6-types.

use thiserror::Error;

/// Errors that can occur when parsing a decrypted BM6 frame.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in bm6-core). A frame that fails
/// to parse is discarded by the session; it never ends the exchange.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The frame is too short to cover the voltage and temperature offsets.
    #[error("Frame requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes needed.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The frame does not start with the voltage/temperature magic prefix.
    #[error("Unexpected frame prefix: {found}")]
    UnexpectedPrefix {
        /// Lowercase hex of the bytes found where the prefix was expected.
        found: String,
    },
}

/// Result type alias using bm6-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
