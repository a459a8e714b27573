//! Transport abstraction for BM6 communication.
//!
//! The scanner and the device session only need a handful of capabilities
//! from a BLE stack. [`Transport`] and [`Connection`] capture exactly those,
//! so the protocol logic runs unchanged over the btleplug backend
//! ([`crate::ble`]) and the in-memory mock ([`crate::mock`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use bm6_types::DeviceAddress;

use crate::error::Result;

/// A single advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Address to connect to.
    pub address: DeviceAddress,
    /// Signal strength in dBm, if the stack reported one.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Create a new advertisement record.
    pub fn new(name: Option<&str>, address: impl Into<DeviceAddress>, rssi: Option<i16>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
            rssi,
        }
    }
}

/// Delivery mode for characteristic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait for the peripheral to acknowledge the write.
    WithResponse,
    /// Fire and forget.
    WithoutResponse,
}

/// Callback invoked once per inbound notification.
///
/// Runs on the transport's delivery task, not on the caller's task. The
/// transport drops the handler when delivery ends, either on unsubscribe or
/// because the link went away.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A BLE stack able to scan and open connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connection handle produced by [`Transport::connect`].
    type Connection: Connection + 'static;

    /// Listen for advertisements for `duration` and return what was heard,
    /// in discovery order.
    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>>;

    /// Open a GATT connection to `address`, giving up after `timeout`.
    async fn connect(&self, address: &DeviceAddress, timeout: Duration)
    -> Result<Self::Connection>;
}

/// An open GATT connection owned by exactly one session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write `data` to the characteristic `uuid`.
    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], mode: WriteMode) -> Result<()>;

    /// Register `handler` for notifications on `uuid`.
    async fn subscribe(&self, uuid: Uuid, handler: NotificationHandler) -> Result<()>;

    /// Stop notifications on `uuid`.
    async fn unsubscribe(&self, uuid: Uuid) -> Result<()>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;

    /// Resolve once the link to the device is gone.
    ///
    /// Stays pending for as long as the device remains connected.
    async fn disconnected(&self);
}
