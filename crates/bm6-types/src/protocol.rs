//! BM6 wire protocol constants.
//!
//! The BM6 shares its framing with the older BM2 monitor: every frame on
//! the control and notification characteristics is a single 16-byte
//! AES-128-CBC block. Only the key differs between the two models.
//!
//! | Byte(s) | Hex offset | Meaning |
//! |---------|------------|---------|
//! | 0..3 | [0:6) | Magic `d1 55 07` (voltage/temperature frame) |
//! | 4 | [8:10) | Temperature, whole degrees Celsius |
//! | 7 (low nibble), 8 | [15:18) | Voltage in hundredths of a volt (12 bits) |

/// Advertised local name of a BM6 monitor.
pub const DEVICE_NAME: &str = "BM6";

/// Length of every encrypted frame (one AES block).
pub const FRAME_LEN: usize = 16;

/// Command asking the monitor to stream voltage/temperature notifications.
///
/// Hex `d1550700000000000000000000000000`: the `d15507` opcode zero-padded
/// to one block before encryption.
pub const COMMAND_READ_VOLTAGE_TEMPERATURE: [u8; FRAME_LEN] = [
    0xd1, 0x55, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Prefix of a decrypted voltage/temperature response.
pub const RESPONSE_MAGIC: [u8; 3] = [0xd1, 0x55, 0x07];

/// Static AES-128 key shared by all BM6 units (`"legend"` + `ff fe` + `"0100009"`).
pub const CIPHER_KEY: [u8; 16] = [
    108, 101, 97, 103, 101, 110, 100, 255, 254, 48, 49, 48, 48, 48, 48, 57,
];

/// Byte index of the temperature value.
pub const TEMPERATURE_OFFSET: usize = 4;

/// Byte index holding the high nibble of the voltage value.
pub const VOLTAGE_HIGH_OFFSET: usize = 7;

/// Byte index holding the low byte of the voltage value.
pub const VOLTAGE_LOW_OFFSET: usize = 8;

/// Minimum decrypted frame length that covers every reading offset.
pub const MIN_READING_FRAME_LEN: usize = VOLTAGE_LOW_OFFSET + 1;

/// Divisor converting the raw voltage value to volts.
pub const VOLTAGE_SCALE: f64 = 100.0;

/// Check whether a decrypted frame carries the voltage/temperature prefix.
pub fn has_reading_prefix(frame: &[u8]) -> bool {
    frame.starts_with(&RESPONSE_MAGIC)
}
