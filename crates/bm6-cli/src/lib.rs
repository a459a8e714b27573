//! Command-line interface for BM6 battery monitors.
//!
//! # Usage
//!
//! | Invocation | Description |
//! |------------|-------------|
//! | `bm6 --scan` | List nearby monitors with their signal strength |
//! | `bm6 --address <address>` | Read voltage and temperature from one monitor |
//!
//! Exactly one of `--scan` and `--address` is required.
//!
//! # Output Formats
//!
//! - **ascii** (default): `Address           RSSI` table, or `Voltage:` / `Temperature:` lines
//! - **json**: `[[address, rssi], ...]` for scans, `{"voltage": v, "temperature": t}` for reads
//!
//! # Configuration
//!
//! Defaults for `format`, `timeout`, `read_timeout` and `scan_duration` can
//! be set in `~/.config/bm6/config.toml` (or platform equivalent).
//!
//! # Exit Status
//!
//! Non-zero when the adapter, connection or read fails, with the reason on
//! stderr. A scan that finds nothing still exits zero.
//!
//! # Examples
//!
//! ```bash
//! bm6 --scan --format json
//! bm6 --address AA:BB:CC:DD:EE:FF --read-timeout 60
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod util;
