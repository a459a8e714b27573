//! A single read session against one BM6 monitor.
//!
//! A session walks a fixed sequence: connect, write the encrypted read
//! command, subscribe to notifications, wait for the first frame that
//! decodes to a [`Reading`], then unsubscribe and close.
//!
//! ```text
//! Disconnected -> Connected -> CommandSent -> Subscribed -> ReadingReceived -> TornDown
//!                     \             \             \
//!                      +-------------+-------------+--> Failed (teardown still runs)
//! ```
//!
//! Notifications arrive on the transport's delivery task. The handler hands
//! the first decoded reading to the waiting session through a oneshot
//! channel guarded by a mutex, so later frames are no-ops and the waiting
//! side never observes a half-written reading.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use bm6_types::protocol::COMMAND_READ_VOLTAGE_TEMPERATURE;
use bm6_types::uuid::{CONTROL, NOTIFY, display_name};
use bm6_types::{DeviceAddress, Reading};

use crate::cipher;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Connection, NotificationHandler, Transport, WriteMode};

/// Timeouts for a read session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Limit for finding and connecting to the device.
    pub connection_timeout: Duration,
    /// Limit for each characteristic operation (write, subscribe,
    /// unsubscribe) and for closing the connection.
    pub operation_timeout: Duration,
    /// Limit for the first reading after subscribing. `None` waits until
    /// cancelled.
    pub read_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SessionConfig {
    /// Create a config with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the reading timeout. `None` waits until cancelled.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection yet.
    Disconnected,
    /// GATT connection open.
    Connected,
    /// Read command acknowledged by the device.
    CommandSent,
    /// Notification handler registered.
    Subscribed,
    /// A reading was handed over by the notification handler.
    ReadingReceived,
    /// Unsubscribed and closed after a successful read.
    TornDown,
    /// A step failed or the session was cancelled.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::CommandSent => "command sent",
            Self::Subscribed => "subscribed",
            Self::ReadingReceived => "reading received",
            Self::TornDown => "torn down",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

type ReadingSlot = Arc<Mutex<Option<oneshot::Sender<Reading>>>>;

/// Decrypt and decode one notification payload.
///
/// Returns `None` for anything that is not a complete voltage/temperature
/// frame. Such frames are expected (the device also sends other frame
/// types) and are only logged at trace level.
pub fn handle_notification(payload: &[u8]) -> Option<Reading> {
    let frame = match cipher::decrypt(payload) {
        Ok(frame) => frame,
        Err(e) => {
            trace!("Discarding notification: {}", e);
            return None;
        }
    };

    match Reading::from_frame(&frame) {
        Ok(reading) => {
            debug!("Decoded frame {}", hex::encode(&frame));
            Some(reading)
        }
        Err(e) => {
            trace!("Discarding frame {}: {}", hex::encode(&frame), e);
            None
        }
    }
}

fn notification_handler(slot: ReadingSlot) -> NotificationHandler {
    Arc::new(move |payload: &[u8]| {
        let Ok(mut pending) = slot.lock() else {
            return;
        };
        if pending.is_none() {
            return;
        }
        if let Some(reading) = handle_notification(payload)
            && let Some(sender) = pending.take()
        {
            // The receiver is gone only if the session stopped waiting.
            let _ = sender.send(reading);
        }
    })
}

async fn release<C: Connection>(
    connection: C,
    address: &DeviceAddress,
    subscribed: bool,
    limit: Duration,
) -> Result<()> {
    if subscribed {
        let result = tokio::time::timeout(limit, connection.unsubscribe(NOTIFY)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to unsubscribe from {}: {}", address, e),
            Err(_) => warn!("Unsubscribe from {} timed out after {:?}", address, limit),
        }
    }
    tokio::time::timeout(limit, connection.close())
        .await
        .map_err(|_| Error::timeout("close", limit))?
}

/// One read session over an exclusively owned connection.
///
/// Call [`Session::teardown`] (or use [`Session::run`], which always does)
/// before dropping. A session dropped while still connected spawns its
/// teardown on the current runtime.
pub struct Session<C: Connection + 'static> {
    address: DeviceAddress,
    config: SessionConfig,
    state: SessionState,
    connection: Option<C>,
    subscribed: bool,
}

impl<C: Connection + 'static> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("subscribed", &self.subscribed)
            .finish()
    }
}

impl<C: Connection + 'static> Session<C> {
    /// Create a disconnected session for `address`.
    pub fn new(address: DeviceAddress, config: SessionConfig) -> Self {
        Self {
            address,
            config,
            state: SessionState::Disconnected,
            connection: None,
            subscribed: false,
        }
    }

    /// Target address.
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Timeouts in effect.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "session is {}, expected {}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn connection(&self) -> Result<&C> {
        self.connection
            .as_ref()
            .ok_or_else(|| Error::InvalidState("session has no open connection".to_string()))
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = SessionState::Failed;
        err
    }

    /// Open the GATT connection.
    ///
    /// On failure the session is `Failed` and holds nothing to tear down.
    #[tracing::instrument(skip_all, fields(address = %self.address))]
    pub async fn connect<T>(&mut self, transport: &T) -> Result<()>
    where
        T: Transport<Connection = C>,
    {
        self.expect_state(SessionState::Disconnected)?;
        info!("Connecting to {}", self.address);

        let result = transport
            .connect(&self.address, self.config.connection_timeout)
            .await;
        match result {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Encrypt and write the read command to FFF3, waiting for the
    /// acknowledgement.
    #[tracing::instrument(skip_all, fields(address = %self.address))]
    pub async fn send_command(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected)?;

        let command = match cipher::encrypt(&COMMAND_READ_VOLTAGE_TEMPERATURE) {
            Ok(command) => command,
            Err(e) => return Err(self.fail(e.into())),
        };
        let limit = self.config.operation_timeout;
        let write = self
            .connection()?
            .write_characteristic(CONTROL, &command, WriteMode::WithResponse);

        let result = tokio::time::timeout(limit, write).await;
        match result {
            Ok(Ok(())) => {
                debug!("Read command acknowledged");
                self.state = SessionState::CommandSent;
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(Error::write_failed(
                display_name(&CONTROL),
                format!("not acknowledged within {:?}", limit),
            ))),
        }
    }

    /// Register for notifications on FFF4.
    ///
    /// The returned receiver resolves with the first frame that decodes to
    /// a reading, and fails if the transport stops delivering first.
    #[tracing::instrument(skip_all, fields(address = %self.address))]
    pub async fn subscribe(&mut self) -> Result<oneshot::Receiver<Reading>> {
        self.expect_state(SessionState::CommandSent)?;

        let (sender, receiver) = oneshot::channel();
        let handler = notification_handler(Arc::new(Mutex::new(Some(sender))));
        let limit = self.config.operation_timeout;
        let subscribe = self.connection()?.subscribe(NOTIFY, handler);

        let result = tokio::time::timeout(limit, subscribe).await;
        match result {
            Ok(Ok(())) => {
                debug!("Subscribed to notifications");
                self.subscribed = true;
                self.state = SessionState::Subscribed;
                Ok(receiver)
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(Error::subscription_failed(
                display_name(&NOTIFY),
                format!("not confirmed within {:?}", limit),
            ))),
        }
    }

    /// Wait for the reading, link loss, the read timeout or cancellation.
    ///
    /// A link lost while waiting fails with
    /// [`ConnectionFailureReason::Lost`], never with [`Error::ReadTimeout`].
    #[tracing::instrument(skip_all, fields(address = %self.address))]
    pub async fn wait_for_reading(
        &mut self,
        receiver: oneshot::Receiver<Reading>,
        cancel: &CancellationToken,
    ) -> Result<Reading> {
        self.expect_state(SessionState::Subscribed)?;

        let limit = self.config.read_timeout;
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let address = self.address.as_str();
        let lost = || Error::connection_failed(address, ConnectionFailureReason::Lost);
        let connection = self.connection()?;

        let outcome = tokio::select! {
            biased;
            received = receiver => received.map_err(|_| lost()),
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = connection.disconnected() => Err(lost()),
            _ = deadline => Err(Error::ReadTimeout {
                duration: limit.unwrap_or_default(),
            }),
        };

        match outcome {
            Ok(reading) => {
                info!(
                    "Reading received: {:.2} V, {} C",
                    reading.voltage, reading.temperature
                );
                self.state = SessionState::ReadingReceived;
                Ok(reading)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Unsubscribe (if subscribed) and close the connection.
    ///
    /// Only the first call does anything. An unsubscribe failure is logged
    /// and does not prevent the close.
    #[tracing::instrument(skip_all, fields(address = %self.address))]
    pub async fn teardown(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        let subscribed = std::mem::take(&mut self.subscribed);

        let result = release(
            connection,
            &self.address,
            subscribed,
            self.config.operation_timeout,
        )
        .await;
        if self.state != SessionState::Failed {
            self.state = SessionState::TornDown;
        }
        debug!("Session torn down");
        result
    }

    async fn exchange(&mut self, cancel: &CancellationToken) -> Result<Reading> {
        self.send_command().await?;
        let receiver = self.subscribe().await?;
        self.wait_for_reading(receiver, cancel).await
    }

    /// Run command, subscribe and wait on a connected session, then tear
    /// down whatever the outcome.
    ///
    /// A teardown failure is logged; it never replaces the session outcome.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<Reading> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = self.exchange(cancel) => outcome,
        };
        if outcome.is_err() {
            self.state = SessionState::Failed;
        }

        if let Err(e) = self.teardown().await {
            warn!("Teardown of {} failed: {}", self.address, e);
        }
        outcome
    }
}

impl<C: Connection + 'static> Drop for Session<C> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        warn!(
            device_address = %self.address,
            "Session dropped without teardown - performing best-effort cleanup"
        );

        let address = self.address.clone();
        let subscribed = self.subscribed;
        let limit = self.config.operation_timeout;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = release(connection, &address, subscribed, limit).await {
                    warn!("Failed to close {} after drop: {}", address, e);
                }
            });
        } else {
            warn!("No tokio runtime available to close {}", address);
        }
    }
}

/// Connect to `address`, read one reading, and tear down.
///
/// Cancelling `cancel` aborts whichever step is in progress; an open
/// connection is still closed before this returns.
///
/// # Errors
///
/// - [`Error::ConnectionFailed`] if the device could not be reached
/// - [`Error::WriteFailed`] / [`Error::SubscriptionFailed`] on GATT failures
/// - [`Error::ReadTimeout`] if no reading arrived within the read timeout
/// - [`Error::Cancelled`] if `cancel` fired first
pub async fn read_reading<T: Transport>(
    transport: &T,
    address: &DeviceAddress,
    config: SessionConfig,
    cancel: &CancellationToken,
) -> Result<Reading> {
    let mut session = Session::new(address.clone(), config);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        connected = session.connect(transport) => connected?,
    }

    session.run(cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockConnection, MockTransport, reading_plaintext};

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn encrypted(plaintext: &[u8]) -> Vec<u8> {
        cipher::encrypt(plaintext).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .connection_timeout(Duration::from_secs(5))
            .operation_timeout(Duration::from_secs(2))
            .read_timeout(None);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn test_handle_notification_decodes_reading() {
        let payload = encrypted(&hex::decode("d155070019000004e200000000000000").unwrap());
        let reading = handle_notification(&payload).unwrap();
        assert_eq!(reading.temperature, 25);
        assert!((reading.voltage - 12.50).abs() < 1e-9);
    }

    #[test]
    fn test_handle_notification_ignores_other_frames() {
        let other = encrypted(&hex::decode("d155080019000004e200000000000000").unwrap());
        assert!(handle_notification(&other).is_none());

        // Not a whole block, so decryption itself fails.
        assert!(handle_notification(&[0x01, 0x02, 0x03]).is_none());
        assert!(handle_notification(&[]).is_none());
    }

    #[test]
    fn test_handler_delivers_only_first_reading() {
        let (sender, mut receiver) = oneshot::channel();
        let slot: ReadingSlot = Arc::new(Mutex::new(Some(sender)));
        let handler = notification_handler(Arc::clone(&slot));

        let mut other = reading_plaintext(1.0, 1);
        other[2] = 0x08;
        handler(&encrypted(&other));
        handler(&encrypted(&reading_plaintext(12.5, 25)));
        handler(&encrypted(&reading_plaintext(13.1, 30)));

        let reading = receiver.try_recv().unwrap();
        assert_eq!(reading.temperature, 25);
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::ReadingReceived.to_string(), "reading received");
        assert_eq!(SessionState::TornDown.to_string(), "torn down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_advance_state() {
        let transport = MockTransport::builder().reading(12.5, 25).build();
        let mut session: Session<MockConnection> =
            Session::new(ADDRESS.into(), SessionConfig::default());
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect(&transport).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.send_command().await.unwrap();
        assert_eq!(session.state(), SessionState::CommandSent);

        let receiver = session.subscribe().await.unwrap();
        assert_eq!(session.state(), SessionState::Subscribed);

        let reading = session
            .wait_for_reading(receiver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reading.temperature, 25);
        assert_eq!(session.state(), SessionState::ReadingReceived);

        session.teardown().await.unwrap();
        assert_eq!(session.state(), SessionState::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_out_of_order_are_rejected() {
        let transport = MockTransport::builder().build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());

        assert!(matches!(
            session.send_command().await,
            Err(Error::InvalidState(_))
        ));

        session.connect(&transport).await.unwrap();
        assert!(matches!(session.subscribe().await, Err(Error::InvalidState(_))));
        session.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_while_waiting_fails_as_lost() {
        let transport = MockTransport::builder()
            .disconnect_after(Duration::from_secs(2))
            .build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
        session.connect(&transport).await.unwrap();
        session.send_command().await.unwrap();
        let receiver = session.subscribe().await.unwrap();

        let started = tokio::time::Instant::now();
        let err = session
            .wait_for_reading(receiver, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::ConnectionFailed {
                reason: ConnectionFailureReason::Lost,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(session.state(), SessionState::Failed);
        session.teardown().await.unwrap();
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_receiver_fails_as_lost() {
        let transport = MockTransport::builder().build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
        session.connect(&transport).await.unwrap();
        session.send_command().await.unwrap();
        let _delivering = session.subscribe().await.unwrap();

        // A receiver whose sender is already gone, as when delivery ends.
        let (sender, receiver) = oneshot::channel::<Reading>();
        drop(sender);

        let err = session
            .wait_for_reading(receiver, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectionFailed {
                reason: ConnectionFailureReason::Lost,
                ..
            }
        ));
        session.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_timeout_bounds_unacknowledged_write() {
        let transport = MockTransport::builder()
            .write_latency(Duration::from_secs(60))
            .build();
        let config = SessionConfig::default().operation_timeout(Duration::from_secs(2));
        let mut session = Session::new(ADDRESS.into(), config);
        session.connect(&transport).await.unwrap();

        let started = tokio::time::Instant::now();
        let err = session.send_command().await.unwrap_err();

        assert!(matches!(err, Error::WriteFailed { .. }));
        assert!(err.to_string().contains("not acknowledged within 2s"));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(session.state(), SessionState::Failed);
        session.teardown().await.unwrap();
        assert_eq!(transport.count(&MockCall::Close), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_once() {
        let transport = MockTransport::builder().build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
        session.connect(&transport).await.unwrap();
        session.send_command().await.unwrap();
        let _receiver = session.subscribe().await.unwrap();

        session.teardown().await.unwrap();
        session.teardown().await.unwrap();

        assert_eq!(transport.count(&MockCall::Unsubscribe(NOTIFY)), 1);
        assert_eq!(transport.count(&MockCall::Close), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_without_subscription_only_closes() {
        let transport = MockTransport::builder().build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
        session.connect(&transport).await.unwrap();

        session.teardown().await.unwrap();
        assert_eq!(transport.count(&MockCall::Unsubscribe(NOTIFY)), 0);
        assert_eq!(transport.count(&MockCall::Close), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_failure_still_closes() {
        let transport = MockTransport::builder()
            .reading(12.5, 25)
            .fail_unsubscribe("gone")
            .build();
        let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
        session.connect(&transport).await.unwrap();

        let reading = session.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(reading.temperature, 25);
        assert_eq!(transport.count(&MockCall::Close), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_spawns_teardown() {
        let transport = MockTransport::builder().build();
        {
            let mut session = Session::new(ADDRESS.into(), SessionConfig::default());
            session.connect(&transport).await.unwrap();
            session.send_command().await.unwrap();
            let _receiver = session.subscribe().await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.count(&MockCall::Unsubscribe(NOTIFY)), 1);
        assert_eq!(transport.count(&MockCall::Close), 1);
    }
}
