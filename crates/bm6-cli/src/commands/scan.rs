//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bm6_core::Transport;
use bm6_core::scan::{self, ScanOptions};

use crate::cli::OutputFormat;
use crate::format::{format_scan_ascii, format_scan_json};
use crate::util::write_output;

/// Scan for monitors and print what was found.
///
/// Finding nothing is reported in the output, not as an error.
pub async fn cmd_scan<T: Transport>(
    transport: &T,
    duration: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<()> {
    let options = ScanOptions::default().duration(duration);

    let devices = scan::scan(transport, &options)
        .await
        .context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Ascii => format_scan_ascii(&devices),
        OutputFormat::Json => format_scan_json(&devices)?,
    };

    write_output(output, &content)
}
