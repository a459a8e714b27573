//! Read command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bm6_core::{DeviceAddress, SessionConfig, Transport, read_reading};
use tokio_util::sync::CancellationToken;

use crate::cli::OutputFormat;
use crate::format::{format_reading_ascii, format_reading_json};
use crate::util::write_output;

/// Take one reading from the monitor at `address` and print it.
pub async fn cmd_read<T: Transport>(
    transport: &T,
    address: &str,
    config: SessionConfig,
    format: OutputFormat,
    output: Option<&PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let address = DeviceAddress::new(address);

    let reading = read_reading(transport, &address, config, cancel)
        .await
        .with_context(|| format!("Failed to read from {}", address))?;

    let content = match format {
        OutputFormat::Ascii => format_reading_ascii(&reading),
        OutputFormat::Json => format_reading_json(&reading)?,
    };

    write_output(output, &content)
}
