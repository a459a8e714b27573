//! Bluetooth UUIDs for BM6 devices.
//!
//! The BM6 exposes its data through a vendor service in the `FFF0` range.
//! The characteristics are commonly referred to by their 16-bit aliases,
//! which expand to full UUIDs on the Bluetooth base UUID.

use uuid::{Uuid, uuid};

/// Vendor service containing the control and notification characteristics (alias `FFF0`).
pub const BM6_SERVICE: Uuid = uuid!("0000fff0-0000-1000-8000-00805f9b34fb");

/// Control characteristic receiving encrypted commands (alias `FFF3`).
pub const CONTROL: Uuid = uuid!("0000fff3-0000-1000-8000-00805f9b34fb");

/// Notification characteristic streaming encrypted frames (alias `FFF4`).
pub const NOTIFY: Uuid = uuid!("0000fff4-0000-1000-8000-00805f9b34fb");

/// Expand a 16-bit alias onto the Bluetooth base UUID.
pub const fn from_short_alias(alias: u16) -> Uuid {
    Uuid::from_fields(
        alias as u32,
        0x0000,
        0x1000,
        &[0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb],
    )
}

/// Extract the 16-bit alias of a UUID built on the Bluetooth base UUID.
///
/// Returns `None` for vendor UUIDs outside the base range.
pub fn short_alias(uuid: &Uuid) -> Option<u16> {
    let (d1, d2, d3, d4) = uuid.as_fields();
    if d1 <= u32::from(u16::MAX)
        && d2 == 0x0000
        && d3 == 0x1000
        && d4 == &[0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb]
    {
        Some(d1 as u16)
    } else {
        None
    }
}

/// Render a UUID as its uppercase short alias when it has one (e.g. `FFF3`).
pub fn display_name(uuid: &Uuid) -> String {
    match short_alias(uuid) {
        Some(alias) => format!("{alias:04X}"),
        None => uuid.to_string(),
    }
}
