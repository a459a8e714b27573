//! btleplug-backed transport.
//!
//! [`BleTransport`] wraps the first Bluetooth adapter on the host and
//! implements [`Transport`]; [`BleConnection`] is the per-session GATT
//! connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bm6_types::DeviceAddress;
use bm6_types::uuid::display_name;

use crate::error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
use crate::transport::{Advertisement, Connection, NotificationHandler, Transport, WriteMode};

/// How often to re-check the peripheral cache while looking for a device.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How often to check the link when adapter events are unavailable.
const LINK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Address reported by CoreBluetooth, which hides MAC addresses.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// MAC address.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier to connect with: the MAC address where the platform
/// exposes one, the peripheral ID otherwise.
fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> DeviceAddress {
    if address == HIDDEN_ADDRESS {
        DeviceAddress::new(format_peripheral_id(peripheral_id))
    } else {
        DeviceAddress::new(address)
    }
}

fn connection_reason(err: &btleplug::Error) -> ConnectionFailureReason {
    match err {
        btleplug::Error::DeviceNotFound => ConnectionFailureReason::OutOfRange,
        btleplug::Error::TimedOut(duration) => ConnectionFailureReason::Timeout(*duration),
        btleplug::Error::PermissionDenied => {
            ConnectionFailureReason::Other("Bluetooth permission denied".to_string())
        }
        other => ConnectionFailureReason::BleError(other.to_string()),
    }
}

/// Adapter-side cleanup that must run even if the owning future is dropped.
///
/// [`Cleanup::run`] awaits the task in place; [`Cleanup::disarm`] skips it.
/// Dropped while still armed, the task is spawned on the current runtime.
struct Cleanup {
    task: Option<BoxFuture<'static, ()>>,
}

impl Cleanup {
    fn new(task: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            task: Some(task.boxed()),
        }
    }

    async fn run(mut self) {
        if let Some(task) = self.task.take() {
            task.await;
        }
    }

    fn disarm(mut self) {
        self.task = None;
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => warn!("No tokio runtime available for BLE cleanup"),
        }
    }
}

/// BLE transport over the host's first Bluetooth adapter.
///
/// Only the connection timeout passed to [`Transport::connect`] bounds
/// anything here; characteristic operations are bounded by the session.
#[derive(Clone)]
pub struct BleTransport {
    adapter: Adapter,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport").finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Open the first available Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))?;

        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn advertisement_for(&self, peripheral: &Peripheral) -> Result<Option<Advertisement>> {
        let Some(props) = peripheral.properties().await? else {
            return Ok(None);
        };
        let address = create_identifier(&props.address.to_string(), &peripheral.id());
        Ok(Some(Advertisement {
            name: props.local_name,
            address,
            rssi: props.rssi,
        }))
    }

    /// Look through peripherals the adapter already knows about.
    async fn cached_peripheral(&self, address: &DeviceAddress) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if address.matches(&format_peripheral_id(&peripheral.id())) {
                debug!("Matched by peripheral ID");
                return Ok(Some(peripheral));
            }
            if let Ok(Some(props)) = peripheral.properties().await {
                let mac = props.address.to_string();
                if mac != HIDDEN_ADDRESS && address.matches(&mac) {
                    debug!("Matched by address: {}", mac);
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    /// Find a peripheral by address, scanning until it shows up.
    ///
    /// Runs until found; the caller bounds it with the connection timeout.
    /// The scan is stopped on every exit, including when this future is
    /// dropped.
    async fn find_peripheral(&self, address: &DeviceAddress) -> Result<Peripheral> {
        if let Some(peripheral) = self.cached_peripheral(address).await? {
            info!("Found device in cache (no scan needed)");
            return Ok(peripheral);
        }

        info!("Device not cached, scanning for {}", address);
        self.adapter.start_scan(ScanFilter::default()).await?;
        let adapter = self.adapter.clone();
        let stop_scan = Cleanup::new(async move {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan after lookup: {}", e);
            }
        });

        let found = loop {
            sleep(FIND_POLL_INTERVAL).await;
            match self.cached_peripheral(address).await {
                Ok(Some(peripheral)) => break Ok(peripheral),
                Ok(None) => continue,
                Err(e) => break Err(e),
            }
        };
        stop_scan.run().await;
        found
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Connection = BleConnection;

    #[tracing::instrument(level = "info", skip_all, fields(duration_secs = duration.as_secs_f32()))]
    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        let mut events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| Error::Scan(e.to_string()))?;

        // Record peripherals in the order they were first heard.
        let mut order: Vec<PeripheralId> = Vec::new();
        let deadline = sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id),
                    ) => {
                        if !order.contains(&id) {
                            order.push(id);
                        }
                    }
                    Some(_) => {}
                    None => {
                        (&mut deadline).await;
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan, keeping results: {}", e);
        }

        // Peripherals the stack knew before the scan emit no discovery event.
        for peripheral in self.adapter.peripherals().await? {
            let id = peripheral.id();
            if !order.contains(&id) {
                order.push(id);
            }
        }

        let mut advertisements = Vec::with_capacity(order.len());
        for id in &order {
            let peripheral = match self.adapter.peripheral(id).await {
                Ok(p) => p,
                Err(e) => {
                    debug!("Peripheral vanished before it could be inspected: {}", e);
                    continue;
                }
            };
            match self.advertisement_for(&peripheral).await {
                Ok(Some(adv)) => advertisements.push(adv),
                Ok(None) => {}
                Err(e) => debug!("Error processing peripheral: {}", e),
            }
        }

        info!("Scan complete. Heard {} advertiser(s)", advertisements.len());
        Ok(advertisements)
    }

    #[tracing::instrument(level = "info", skip_all, fields(address = %address))]
    async fn connect(
        &self,
        address: &DeviceAddress,
        connect_timeout: Duration,
    ) -> Result<BleConnection> {
        let started = Instant::now();

        let peripheral = match timeout(connect_timeout, self.find_peripheral(address)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::connection_failed(
                    address.as_str(),
                    ConnectionFailureReason::OutOfRange,
                ));
            }
        };

        info!("Connecting to device...");
        // Armed until a BleConnection owns the link.
        let link = {
            let peripheral = peripheral.clone();
            Cleanup::new(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Disconnect of half-open link failed: {}", e);
                }
            })
        };

        let remaining = connect_timeout.saturating_sub(started.elapsed());
        match timeout(remaining, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                link.disarm();
                return Err(Error::connection_failed(
                    address.as_str(),
                    connection_reason(&e),
                ));
            }
            Err(_) => {
                link.run().await;
                return Err(Error::connection_failed(
                    address.as_str(),
                    ConnectionFailureReason::Timeout(connect_timeout),
                ));
            }
        }
        info!("Connected!");

        let remaining = connect_timeout.saturating_sub(started.elapsed());
        let result = BleConnection::discover(
            self.adapter.clone(),
            peripheral,
            address.clone(),
            remaining,
        )
        .await;
        match result {
            Ok(connection) => {
                link.disarm();
                Ok(connection)
            }
            Err(e) => {
                link.run().await;
                Err(e)
            }
        }
    }
}

/// An open GATT connection to a BM6 monitor.
///
/// # Cleanup
///
/// Call [`Connection::close`] before dropping. A connection dropped while
/// still open logs a warning and disconnects in the background.
pub struct BleConnection {
    adapter: Adapter,
    peripheral: Peripheral,
    address: DeviceAddress,
    /// Discovered characteristics by UUID.
    characteristics: HashMap<Uuid, Characteristic>,
    /// Notification delivery tasks, aborted on unsubscribe/close.
    notification_tasks: Mutex<Vec<(Uuid, JoinHandle<()>)>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for BleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleConnection")
            .field("address", &self.address)
            .field("characteristics", &self.characteristics.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BleConnection {
    async fn discover(
        adapter: Adapter,
        peripheral: Peripheral,
        address: DeviceAddress,
        limit: Duration,
    ) -> Result<Self> {
        info!("Discovering services...");
        timeout(limit, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", limit))??;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for char in service.characteristics {
                debug!("    Characteristic: {}", char.uuid);
                characteristics.insert(char.uuid, char);
            }
        }
        debug!("Cached {} characteristics", characteristics.len());

        Ok(Self {
            adapter,
            peripheral,
            address,
            characteristics,
            notification_tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Address this connection was opened with.
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| Error::characteristic_not_found(display_name(&uuid)))
    }
}

#[async_trait]
impl Connection for BleConnection {
    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], mode: WriteMode) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        self.peripheral
            .write(characteristic, data, write_type)
            .await
            .map_err(|e| Error::write_failed(display_name(&uuid), e.to_string()))
    }

    async fn subscribe(&self, uuid: Uuid, handler: NotificationHandler) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;

        // Open the stream first so no notification slips by between the
        // subscribe request and the task starting.
        let mut stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| Error::subscription_failed(display_name(&uuid), e.to_string()))?;

        self.peripheral
            .subscribe(characteristic)
            .await
            .map_err(|e| Error::subscription_failed(display_name(&uuid), e.to_string()))?;

        // The stream ends when the link drops, which releases the handler.
        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    handler(&notification.value);
                }
            }
            debug!("Notification stream for {} ended", display_name(&uuid));
        });
        self.notification_tasks.lock().await.push((uuid, handle));

        Ok(())
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<()> {
        {
            let mut tasks = self.notification_tasks.lock().await;
            tasks.retain(|(task_uuid, handle)| {
                if *task_uuid == uuid {
                    handle.abort();
                    false
                } else {
                    true
                }
            });
        }

        let characteristic = self.characteristic(uuid)?;
        self.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn close(&self) -> Result<()> {
        info!("Disconnecting from device...");
        self.closed.store(true, Ordering::SeqCst);

        {
            let mut tasks = self.notification_tasks.lock().await;
            for (_, handle) in tasks.drain(..) {
                handle.abort();
            }
        }

        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn disconnected(&self) {
        let id = self.peripheral.id();
        // Subscribe before checking, so a drop in between is not missed.
        let events = self.adapter.events().await;
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return;
        }

        match events {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    if let CentralEvent::DeviceDisconnected(gone) = event
                        && gone == id
                    {
                        info!("Device disconnected");
                        return;
                    }
                }
                debug!("Adapter event stream ended, polling connection state");
            }
            Err(e) => debug!("No adapter events ({}), polling connection state", e),
        }

        loop {
            sleep(LINK_POLL_INTERVAL).await;
            if !self.peripheral.is_connected().await.unwrap_or(false) {
                info!("Device disconnected");
                return;
            }
        }
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!(
            device_address = %self.address,
            "Connection dropped without close() - performing best-effort disconnect"
        );

        if let Ok(mut tasks) = self.notification_tasks.try_lock() {
            for (_, handle) in tasks.drain(..) {
                handle.abort();
            }
        }

        let peripheral = self.peripheral.clone();
        let address = self.address.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(
                        device_address = %address,
                        error = %e,
                        "Best-effort disconnect failed (device may already be disconnected)"
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_cleanup_spawned_when_dropped_armed() {
        let (done, finished) = oneshot::channel();
        let lookup = async move {
            let _stop_scan = Cleanup::new(async move {
                let _ = done.send(());
            });
            std::future::pending::<()>().await;
        };

        // The lookup is abandoned by its deadline, as the connect timeout does.
        assert!(timeout(Duration::from_millis(10), lookup).await.is_err());
        timeout(Duration::from_secs(1), finished)
            .await
            .expect("cleanup should run after the lookup is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_run_completes_in_place() {
        let (done, mut finished) = oneshot::channel();
        Cleanup::new(async move {
            let _ = done.send(());
        })
        .run()
        .await;
        assert!(finished.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_disarmed_cleanup_never_runs() {
        let (done, finished) = oneshot::channel::<()>();
        Cleanup::new(async move {
            let _ = done.send(());
        })
        .disarm();
        // The task was dropped unpolled, taking the sender with it.
        assert!(finished.await.is_err());
    }

    #[test]
    fn test_connection_reason_mapping() {
        assert_eq!(
            connection_reason(&btleplug::Error::DeviceNotFound),
            ConnectionFailureReason::OutOfRange
        );
        assert_eq!(
            connection_reason(&btleplug::Error::TimedOut(Duration::from_secs(3))),
            ConnectionFailureReason::Timeout(Duration::from_secs(3))
        );
        assert!(matches!(
            connection_reason(&btleplug::Error::NotConnected),
            ConnectionFailureReason::BleError(_)
        ));
    }
}
