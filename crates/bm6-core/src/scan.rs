//! Device discovery and scanning.
//!
//! This module filters BLE advertisements down to BM6 monitors.

use std::time::Duration;

use tracing::{debug, info, warn};

use bm6_types::ScanResult;
use bm6_types::protocol::DEVICE_NAME;

use crate::ble::BleTransport;
use crate::error::{Error, Result};
use crate::transport::{Advertisement, Transport};

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to listen for advertisements.
    pub duration: Duration,
    /// Advertised local name to keep (exact, case-sensitive match).
    pub name_filter: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            name_filter: DEVICE_NAME.to_string(),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Set the advertised name to match.
    #[must_use]
    pub fn name_filter(mut self, name: impl Into<String>) -> Self {
        self.name_filter = name.into();
        self
    }
}

/// Keep the advertisements whose name matches `name` exactly.
///
/// Order is preserved and duplicates are kept. Advertisements without an
/// RSSI are dropped: the stack reports those for peripherals it remembers
/// from earlier sessions but did not hear during this scan.
pub fn filter_advertisements(advertisements: Vec<Advertisement>, name: &str) -> Vec<ScanResult> {
    advertisements
        .into_iter()
        .filter(|adv| adv.name.as_deref() == Some(name))
        .filter_map(|adv| match adv.rssi {
            Some(rssi) => Some(ScanResult::new(adv.address, rssi)),
            None => {
                debug!("Skipping {} (no RSSI, not heard this scan)", adv.address);
                None
            }
        })
        .collect()
}

/// Scan for BM6 monitors over `transport`.
///
/// An empty list means nothing matched; it is not an error. A scan the
/// adapter refused to start is logged and also yields an empty list.
///
/// # Errors
///
/// Returns an error for transport failures other than [`Error::Scan`],
/// such as a missing adapter.
pub async fn scan<T: Transport>(transport: &T, options: &ScanOptions) -> Result<Vec<ScanResult>> {
    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    let advertisements = match transport.scan_advertisements(options.duration).await {
        Ok(advertisements) => advertisements,
        Err(Error::Scan(reason)) => {
            warn!("Scan failed, reporting no devices: {}", reason);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let heard = advertisements.len();
    let devices = filter_advertisements(advertisements, &options.name_filter);

    info!(
        "Scan complete. Found {} {} device(s) among {} advertiser(s)",
        devices.len(),
        options.name_filter,
        heard
    );
    Ok(devices)
}

/// Scan for BM6 monitors on the default adapter with default options.
pub async fn scan_for_devices() -> Result<Vec<ScanResult>> {
    let transport = BleTransport::new().await?;
    scan(&transport, &ScanOptions::default()).await
}
