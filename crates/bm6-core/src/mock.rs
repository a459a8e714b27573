//! Mock transport for testing.
//!
//! This module provides an in-memory [`Transport`] that can be used for unit
//! testing without requiring actual BLE hardware.
//!
//! # Features
//!
//! - **Scripted advertisements**: the results a scan will report
//! - **Scripted notifications**: frames delivered from a spawned task once the
//!   session subscribes, optionally spaced out by a delay
//! - **Failure injection**: fail scan, connect, write, subscribe, unsubscribe or close
//! - **Link loss**: drop the connection a set time after connecting
//! - **Call log**: every transport call is recorded as a [`MockCall`] so
//!   tests can assert ordering and exactly-once teardown
//!
//! # Example
//!
//! ```
//! use bm6_core::mock::{MockCall, MockTransport};
//! use bm6_core::session::{SessionConfig, read_reading};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = MockTransport::builder().reading(12.5, 25).build();
//!     let reading = read_reading(
//!         &transport,
//!         &"AA:BB:CC:DD:EE:FF".into(),
//!         SessionConfig::default(),
//!         &CancellationToken::new(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     assert_eq!(reading.temperature, 25);
//!     assert_eq!(transport.calls().last(), Some(&MockCall::Close));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use bm6_types::protocol::{
    FRAME_LEN, RESPONSE_MAGIC, TEMPERATURE_OFFSET, VOLTAGE_HIGH_OFFSET, VOLTAGE_LOW_OFFSET,
    VOLTAGE_SCALE,
};
use bm6_types::uuid::display_name;
use bm6_types::DeviceAddress;

use crate::cipher;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Advertisement, Connection, NotificationHandler, Transport, WriteMode};

/// A transport call recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `scan_advertisements` was called.
    Scan,
    /// `connect` was called for this address.
    Connect(DeviceAddress),
    /// A characteristic write.
    Write {
        /// Target characteristic.
        uuid: Uuid,
        /// Bytes written (still encrypted).
        data: Vec<u8>,
        /// Requested delivery mode.
        mode: WriteMode,
    },
    /// Notifications were requested on this characteristic.
    Subscribe(Uuid),
    /// Notifications were cancelled on this characteristic.
    Unsubscribe(Uuid),
    /// The connection was closed.
    Close,
}

#[derive(Debug, Default, Clone)]
struct Failures {
    scan: Option<String>,
    connect: Option<ConnectionFailureReason>,
    write: Option<String>,
    subscribe: Option<String>,
    unsubscribe: Option<String>,
    close: Option<String>,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<MockCall>>,
    delivery_tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Shared {
    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }
}

// Poisoning is ignored so the call log stays readable after a failed assertion.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory [`Transport`] for testing.
///
/// Every connection it opens shares the transport's call log.
#[derive(Clone)]
pub struct MockTransport {
    advertisements: Vec<Advertisement>,
    frames: Arc<Vec<Vec<u8>>>,
    frame_delay: Duration,
    connect_latency: Duration,
    write_latency: Duration,
    disconnect_after: Option<Duration>,
    failures: Failures,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("advertisements", &self.advertisements.len())
            .field("frames", &self.frames.len())
            .field("frame_delay", &self.frame_delay)
            .field("disconnect_after", &self.disconnect_after)
            .field("failures", &self.failures)
            .finish()
    }
}

impl MockTransport {
    /// Start building a mock transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    /// Snapshot of every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.shared.calls).clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &MockCall) -> usize {
        lock(&self.shared.calls).iter().filter(|c| *c == call).count()
    }

    /// Number of characteristic writes recorded.
    pub fn write_count(&self) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|c| matches!(c, MockCall::Write { .. }))
            .count()
    }

    /// Whether a delivery task is still running for `uuid`.
    pub fn is_delivering(&self, uuid: Uuid) -> bool {
        lock(&self.shared.delivery_tasks)
            .get(&uuid)
            .is_some_and(|task| !task.is_finished())
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        self.shared.record(MockCall::Scan);
        if let Some(reason) = &self.failures.scan {
            return Err(Error::Scan(reason.clone()));
        }
        tokio::time::sleep(duration).await;
        Ok(self.advertisements.clone())
    }

    async fn connect(&self, address: &DeviceAddress, timeout: Duration) -> Result<MockConnection> {
        self.shared.record(MockCall::Connect(address.clone()));

        if !self.connect_latency.is_zero() {
            if self.connect_latency >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(Error::connection_failed(
                    address.as_str(),
                    ConnectionFailureReason::Timeout(timeout),
                ));
            }
            tokio::time::sleep(self.connect_latency).await;
        }

        if let Some(reason) = &self.failures.connect {
            return Err(Error::connection_failed(address.as_str(), reason.clone()));
        }

        debug!("Mock connected to {}", address);
        Ok(MockConnection {
            frames: Arc::clone(&self.frames),
            frame_delay: self.frame_delay,
            write_latency: self.write_latency,
            lost_at: self.disconnect_after.map(|after| Instant::now() + after),
            failures: self.failures.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Connection handle produced by [`MockTransport`].
pub struct MockConnection {
    frames: Arc<Vec<Vec<u8>>>,
    frame_delay: Duration,
    write_latency: Duration,
    lost_at: Option<Instant>,
    failures: Failures,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("frames", &self.frames.len())
            .field("frame_delay", &self.frame_delay)
            .field("lost_at", &self.lost_at)
            .finish()
    }
}

// Resolves at `lost_at`, or never when the link is never lost.
async fn link_lost(lost_at: Option<Instant>) {
    match lost_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl MockConnection {
    fn stop_delivery(&self, uuid: Option<Uuid>) {
        let mut tasks = lock(&self.shared.delivery_tasks);
        match uuid {
            Some(uuid) => {
                if let Some(task) = tasks.remove(&uuid) {
                    task.abort();
                }
            }
            None => {
                for (_, task) in tasks.drain() {
                    task.abort();
                }
            }
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], mode: WriteMode) -> Result<()> {
        self.shared.record(MockCall::Write {
            uuid,
            data: data.to_vec(),
            mode,
        });
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
        match &self.failures.write {
            Some(reason) => Err(Error::write_failed(display_name(&uuid), reason.clone())),
            None => Ok(()),
        }
    }

    async fn subscribe(&self, uuid: Uuid, handler: NotificationHandler) -> Result<()> {
        self.shared.record(MockCall::Subscribe(uuid));
        if let Some(reason) = &self.failures.subscribe {
            return Err(Error::subscription_failed(display_name(&uuid), reason.clone()));
        }

        let frames = Arc::clone(&self.frames);
        let delay = self.frame_delay;
        let lost_at = self.lost_at;
        // The handler lives until unsubscribe aborts the task or the link drops.
        let task = tokio::spawn(async move {
            let deliver = async {
                for frame in frames.iter() {
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    handler(frame);
                }
                std::future::pending::<()>().await;
            };
            tokio::select! {
                biased;
                _ = link_lost(lost_at) => debug!("Mock link lost, ending delivery"),
                _ = deliver => {}
            }
        });

        if let Some(previous) = lock(&self.shared.delivery_tasks).insert(uuid, task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<()> {
        self.shared.record(MockCall::Unsubscribe(uuid));
        self.stop_delivery(Some(uuid));
        match &self.failures.unsubscribe {
            Some(reason) => Err(Error::subscription_failed(display_name(&uuid), reason.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.shared.record(MockCall::Close);
        self.stop_delivery(None);
        match &self.failures.close {
            Some(reason) => Err(Error::Bluetooth(btleplug::Error::Other(reason.clone().into()))),
            None => Ok(()),
        }
    }

    async fn disconnected(&self) {
        link_lost(self.lost_at).await;
    }
}

/// Build the decrypted form of a voltage/temperature frame.
///
/// Voltage is rounded to hundredths and truncated to the 12 bits the
/// frame carries.
pub fn reading_plaintext(voltage: f64, temperature: u8) -> [u8; FRAME_LEN] {
    let raw = ((voltage * VOLTAGE_SCALE).round() as u16) & 0x0FFF;
    let mut frame = [0u8; FRAME_LEN];
    frame[..RESPONSE_MAGIC.len()].copy_from_slice(&RESPONSE_MAGIC);
    frame[TEMPERATURE_OFFSET] = temperature;
    frame[VOLTAGE_HIGH_OFFSET] = (raw >> 8) as u8;
    frame[VOLTAGE_LOW_OFFSET] = (raw & 0xFF) as u8;
    frame
}

/// Builder for [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    advertisements: Vec<Advertisement>,
    frames: Vec<Vec<u8>>,
    frame_delay: Duration,
    connect_latency: Duration,
    write_latency: Duration,
    disconnect_after: Option<Duration>,
    failures: Failures,
}

impl MockTransportBuilder {
    /// Create a builder with no advertisements, no frames and no failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an advertisement the next scan will report.
    #[must_use]
    pub fn advertisement(
        mut self,
        name: Option<&str>,
        address: impl Into<DeviceAddress>,
        rssi: Option<i16>,
    ) -> Self {
        self.advertisements
            .push(Advertisement::new(name, address, rssi));
        self
    }

    /// Queue a raw notification payload, delivered as-is.
    #[must_use]
    pub fn frame(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.frames.push(payload.into());
        self
    }

    /// Queue a plaintext frame, encrypted before delivery.
    #[must_use]
    pub fn plaintext_frame(mut self, plaintext: &[u8]) -> Self {
        match cipher::encrypt(plaintext) {
            Ok(frame) => self.frames.push(frame),
            Err(e) => warn!("Dropping scripted frame: {}", e),
        }
        self
    }

    /// Queue an encrypted voltage/temperature frame.
    #[must_use]
    pub fn reading(self, voltage: f64, temperature: u8) -> Self {
        self.plaintext_frame(&reading_plaintext(voltage, temperature))
    }

    /// Wait this long before delivering each queued frame.
    #[must_use]
    pub fn frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Delay every connect attempt.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Delay the acknowledgement of every characteristic write.
    #[must_use]
    pub fn write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Drop the link this long after each connection opens.
    ///
    /// Frames not yet delivered by then are never delivered.
    #[must_use]
    pub fn disconnect_after(mut self, after: Duration) -> Self {
        self.disconnect_after = Some(after);
        self
    }

    /// Make the adapter refuse to scan.
    #[must_use]
    pub fn fail_scan(mut self, reason: &str) -> Self {
        self.failures.scan = Some(reason.to_string());
        self
    }

    /// Make every connect attempt fail.
    #[must_use]
    pub fn fail_connect(mut self, reason: ConnectionFailureReason) -> Self {
        self.failures.connect = Some(reason);
        self
    }

    /// Make characteristic writes go unacknowledged.
    #[must_use]
    pub fn fail_write(mut self, reason: &str) -> Self {
        self.failures.write = Some(reason.to_string());
        self
    }

    /// Make notification registration fail.
    #[must_use]
    pub fn fail_subscribe(mut self, reason: &str) -> Self {
        self.failures.subscribe = Some(reason.to_string());
        self
    }

    /// Make unsubscribing fail.
    #[must_use]
    pub fn fail_unsubscribe(mut self, reason: &str) -> Self {
        self.failures.unsubscribe = Some(reason.to_string());
        self
    }

    /// Make closing the connection fail.
    #[must_use]
    pub fn fail_close(mut self, reason: &str) -> Self {
        self.failures.close = Some(reason.to_string());
        self
    }

    /// Build the transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            advertisements: self.advertisements,
            frames: Arc::new(self.frames),
            frame_delay: self.frame_delay,
            connect_latency: self.connect_latency,
            write_latency: self.write_latency,
            disconnect_after: self.disconnect_after,
            failures: self.failures,
            shared: Arc::new(Shared::default()),
        }
    }
}
