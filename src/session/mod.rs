//! Session with a single ELK-BLEDOM controller.
//!
//! A [`Session`] finds the controller by its advertised name, connects, locates
//! the command characteristic and then hands both to a serializer task. From then
//! on every write and state read goes through that task.
//!
//! Sessions are single-use: once closed or failed, build a new one to retry.

pub mod config;
pub mod serializer;
pub mod state;

use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ble::radio::{Advertisement, Characteristic, Connection, ConnectionParams, Radio};
use crate::ble::scanner::BtleplugRadio;
use crate::ble::uuids::{LED_CHARACTERISTIC_UUID, LED_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::protocol::Command;

pub use config::SessionConfig;
pub use serializer::{OperationError, OperationKind, PollCallback};
pub use state::{FailureKind, SessionState};

use serializer::{run_poller, PendingOperation, Serializer, REQUEST_QUEUE_DEPTH};
use state::StateCell;

/// Handle for a registered state poller.
///
/// Pollers stop on their own when the session stops. Dropping the handle does
/// not stop the poller; call [`PollerHandle::unregister`].
#[derive(Debug)]
pub struct PollerHandle {
    id: u64,
    cancel: CancellationToken,
}

impl PollerHandle {
    /// Stop this poller.
    pub fn unregister(self) {
        self.cancel.cancel();
    }

    /// Get the poller ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the poller is still scheduled.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// A connection session with one ELK-BLEDOM LED controller.
pub struct Session {
    /// Radio used for scanning and connecting.
    radio: Arc<dyn Radio>,
    /// Parameters for the radio-level connect.
    connection_params: ConnectionParams,
    /// Timeout used by `connect_default`.
    scan_timeout: Duration,
    /// Consecutive write failures tolerated before closing.
    write_error_limit: Option<u32>,
    /// Lifecycle state.
    state: Arc<StateCell>,
    /// One-shot stop signal shared with every task.
    cancel: CancellationToken,
    /// Request queue into the serializer.
    request_tx: mpsc::Sender<PendingOperation>,
    /// Receiving end of the queue, handed to the serializer on Ready.
    request_rx: Mutex<Option<mpsc::Receiver<PendingOperation>>>,
    /// Steady-state failure channel.
    error_tx: broadcast::Sender<OperationError>,
    /// Poller ID counter.
    poller_counter: AtomicU64,
}

impl Session {
    /// Create a new session.
    ///
    /// If the configuration names no radio, the first btleplug adapter is used.
    ///
    /// # Errors
    ///
    /// Returns an error if no radio is configured and Bluetooth is not available.
    pub async fn new(mut config: SessionConfig) -> Result<Self> {
        let radio: Arc<dyn Radio> = match config.take_radio() {
            Some(radio) => radio,
            None => Arc::new(BtleplugRadio::new().await?),
        };

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (error_tx, _) = broadcast::channel(32);

        Ok(Self {
            radio,
            connection_params: *config.connection_params(),
            scan_timeout: config.scan_timeout(),
            write_error_limit: config.write_error_limit(),
            state: Arc::new(StateCell::new()),
            cancel: CancellationToken::new(),
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            error_tx,
            poller_counter: AtomicU64::new(0),
        })
    }

    // === Lifecycle ===

    /// Get the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Check if the session is ready for commands.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Connect using the configured scan timeout.
    pub async fn connect_default(&self) -> Result<()> {
        self.connect(self.scan_timeout).await
    }

    /// Find, connect to and prepare the controller.
    ///
    /// Waits up to `timeout` for a matching advertisement. The timeout does not
    /// bound the connect or discovery steps that follow a match.
    ///
    /// # Errors
    ///
    /// - [`Error::ScanTimeout`] if no controller advertised in time.
    /// - [`Error::ConnectionFailed`] if the radio-level connect failed.
    /// - [`Error::ServiceNotAvailable`] / [`Error::CharacteristicNotAvailable`]
    ///   if the device lacks the LED service or characteristic.
    /// - [`Error::Cancelled`] if [`Session::stop`] was called meanwhile.
    ///
    /// Every failure is terminal for this session.
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::SessionClosed);
        }

        if !self.state.transition(SessionState::Scanning) {
            return Err(Error::InvalidState {
                state: self.state(),
            });
        }

        info!("Connecting to LED controller (scan timeout {:?})", timeout);

        match self.establish(timeout).await {
            Ok((connection, characteristic)) => {
                self.start_serializer(connection, characteristic)?;
                info!("LED controller ready");
                Ok(())
            }
            Err(e) => {
                self.state.transition(SessionState::Failed(failure_kind(&e)));
                self.cancel.cancel();
                warn!("Failed to connect to LED controller: {}", e);
                Err(e)
            }
        }
    }

    /// Request shutdown.
    ///
    /// Idempotent and non-blocking. Requests that have not been admitted by the
    /// serializer yet may be dropped.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested");
        }
        self.cancel.cancel();

        // A session that never started has nothing to disconnect.
        self.state.transition(SessionState::Closed);
    }

    /// Wait until the session has closed or failed.
    pub async fn wait_for_termination(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    // === Commands ===

    /// Encode and queue a command for the controller.
    ///
    /// Waits until the serializer admits the request. There is no confirmation
    /// of delivery; failed writes are reported on [`Session::subscribe_errors`].
    pub async fn submit_command(&self, command: impl Into<Command>) -> Result<()> {
        let command = command.into();
        trace!("Submitting {:?}", command);
        self.submit(PendingOperation::Write(command.encode())).await
    }

    /// Read the device state every `interval` and pass it to `callback`.
    ///
    /// The callback runs on the serializer task and blocks every other request
    /// while it runs, so keep it short. The first read happens one interval
    /// after registration. Must be called from within a tokio runtime.
    pub fn register_poller<F>(&self, interval: Duration, callback: F) -> Result<PollerHandle>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.ensure_ready()?;

        let invalid = || Error::InvalidParameter {
            name: "interval".to_string(),
            value: format!("{:?}", interval),
        };
        if interval.is_zero() {
            return Err(invalid());
        }

        // The second tick must also be representable, or the timer panics later.
        let start = tokio::time::Instant::now()
            .checked_add(interval)
            .filter(|start| start.checked_add(interval).is_some())
            .ok_or_else(invalid)?;

        let id = self.poller_counter.fetch_add(1, Ordering::SeqCst);
        let cancel = self.cancel.child_token();
        let callback: PollCallback = Arc::new(callback);

        tokio::spawn(run_poller(
            id,
            start,
            interval,
            callback,
            self.request_tx.clone(),
            cancel.clone(),
        ));

        Ok(PollerHandle { id, cancel })
    }

    /// Subscribe to failed writes, reads and disconnects.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<OperationError> {
        self.error_tx.subscribe()
    }

    // === Internal ===

    fn ensure_ready(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::SessionClosed);
        }

        let state = self.state();
        if !state.is_ready() {
            return Err(Error::InvalidState { state });
        }

        Ok(())
    }

    async fn submit(&self, operation: PendingOperation) -> Result<()> {
        self.ensure_ready()?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::SessionClosed),
            sent = self.request_tx.send(operation) => sent.map_err(|_| Error::SessionClosed),
        }
    }

    /// Run `future` unless the session is stopped first.
    async fn cancellable<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = future => result,
        }
    }

    async fn establish(
        &self,
        timeout: Duration,
    ) -> Result<(Box<dyn Connection>, Box<dyn Characteristic>)> {
        self.cancellable(self.radio.enable()).await?;

        let advertisement = self.scan(timeout).await?;
        self.state.transition(SessionState::Connecting);

        info!(
            "Found {} ({})",
            advertisement.local_name.as_deref().unwrap_or_default(),
            advertisement.address
        );

        let connection = self
            .cancellable(
                self.radio
                    .connect(&advertisement.address, &self.connection_params),
            )
            .await
            .map_err(|e| match e {
                Error::Cancelled => e,
                e => Error::ConnectionFailed {
                    address: advertisement.address.clone(),
                    source: Box::new(e),
                },
            })?;

        self.state.transition(SessionState::DiscoveringService);

        match self.discover(connection.as_ref()).await {
            Ok(characteristic) => Ok((connection, characteristic)),
            Err(e) => {
                if let Err(disconnect_error) = connection.disconnect().await {
                    warn!(
                        "Failed to disconnect after discovery error: {}",
                        disconnect_error
                    );
                }
                Err(e)
            }
        }
    }

    /// Wait for the first advertisement from a controller, then stop scanning.
    async fn scan(&self, timeout: Duration) -> Result<Advertisement> {
        let mut adverts = self.cancellable(self.radio.start_scan()).await?;

        let first_match = async {
            while let Some(advert) = adverts.next().await {
                if advert.is_bledom() {
                    return advert;
                }
                trace!("Ignoring advertisement from {}", advert.address);
            }

            debug!("Advertisement stream ended before a controller was found");
            futures::future::pending::<Advertisement>().await
        };

        let outcome = self
            .cancellable(async {
                tokio::time::timeout(timeout, first_match)
                    .await
                    .map_err(|_elapsed| Error::ScanTimeout { timeout })
            })
            .await;

        drop(adverts);
        if let Err(e) = self.radio.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        outcome
    }

    async fn discover(&self, connection: &dyn Connection) -> Result<Box<dyn Characteristic>> {
        let mut services = self
            .cancellable(connection.discover_services(LED_SERVICE_UUID))
            .await?;
        if services.is_empty() {
            return Err(Error::ServiceNotAvailable {
                uuid: LED_SERVICE_UUID.to_string(),
            });
        }
        let service = services.swap_remove(0);
        debug!("Found service {}", service.uuid());

        self.state.transition(SessionState::DiscoveringCharacteristic);

        let mut characteristics = self
            .cancellable(service.discover_characteristics(LED_CHARACTERISTIC_UUID))
            .await?;
        if characteristics.is_empty() {
            return Err(Error::CharacteristicNotAvailable {
                uuid: LED_CHARACTERISTIC_UUID.to_string(),
            });
        }
        let characteristic = characteristics.swap_remove(0);
        debug!("Found characteristic {}", characteristic.uuid());

        Ok(characteristic)
    }

    fn start_serializer(
        &self,
        connection: Box<dyn Connection>,
        characteristic: Box<dyn Characteristic>,
    ) -> Result<()> {
        let requests = self
            .request_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("Serializer already started".to_string()))?;

        self.state.transition(SessionState::Ready);

        let serializer = Serializer::new(
            connection,
            characteristic,
            requests,
            self.cancel.clone(),
            self.state.clone(),
            self.error_tx.clone(),
            self.write_error_limit,
        );
        tokio::spawn(serializer.run());

        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("scan_timeout", &self.scan_timeout)
            .field("connection_params", &self.connection_params)
            .finish()
    }
}

/// Map a connect error to the failure recorded in the session state.
fn failure_kind(error: &Error) -> FailureKind {
    match error {
        Error::ScanTimeout { .. } => FailureKind::ScanTimeout,
        Error::ConnectionFailed { .. } => FailureKind::ConnectError,
        Error::ServiceNotAvailable { .. } => FailureKind::ServiceNotAvailable,
        Error::CharacteristicNotAvailable { .. } => FailureKind::CharacteristicNotAvailable,
        Error::Cancelled => FailureKind::Cancelled,
        _ => FailureKind::Radio,
    }
}
