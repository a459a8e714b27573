//! Output formatting.
//!
//! JSON is written with `", "` and `": "` separators so that scripts
//! written against earlier BM6 tooling keep parsing the same text.

use std::io;

use anyhow::Result;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

use bm6_types::{Reading, ScanResult};

/// Header line of the ascii scan table.
pub const SCAN_HEADER: &str = "Address           RSSI";

/// Line printed when a scan matched nothing.
pub const NO_DEVICES: &str = "No BM6 devices found.";

/// Compact JSON with a space after each separator.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}

/// Format scan results as an ascii table.
pub fn format_scan_ascii(devices: &[ScanResult]) -> String {
    if devices.is_empty() {
        return format!("{}\n", NO_DEVICES);
    }

    let mut output = format!("{}\n", SCAN_HEADER);
    for device in devices {
        output.push_str(&format!("{} {}\n", device.address, device.rssi));
    }
    output
}

/// Format scan results as a JSON array of `[address, rssi]` pairs.
pub fn format_scan_json(devices: &[ScanResult]) -> Result<String> {
    let pairs: Vec<(&str, i16)> = devices
        .iter()
        .map(|d| (d.address.as_str(), d.rssi))
        .collect();
    Ok(format!("{}\n", to_spaced_json(&pairs)?))
}

/// Shortest decimal form of `value`, always with a fractional part.
///
/// Matches the JSON rendering, so `12.5` stays `12.5` and `13.0` keeps its `.0`.
fn decimal(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

/// Format a reading as two ascii lines.
pub fn format_reading_ascii(reading: &Reading) -> String {
    format!(
        "Voltage: {}\nTemperature: {}\n",
        decimal(reading.voltage),
        reading.temperature
    )
}

/// Format a reading as a JSON object.
pub fn format_reading_json(reading: &Reading) -> Result<String> {
    Ok(format!("{}\n", to_spaced_json(reading)?))
}
