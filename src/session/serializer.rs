//! Command/poll serializer.
//!
//! Once a session is ready, a single task owns the connection and the command
//! characteristic. Writes and state polls reach it through one bounded queue, so
//! at most one characteristic operation is ever in flight. Mutual exclusion comes
//! from that ownership, not from a lock.
//!
//! Requests are admitted in FIFO order across both kinds: the queue has a single
//! slot and tokio's bounded sender wakes blocked submitters in the order they
//! started waiting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ble::radio::{Characteristic, Connection};
use crate::ble::uuids::STATE_READ_LEN;
use crate::error::Error;
use crate::protocol::Frame;
use crate::session::state::{SessionState, StateCell};

/// Capacity of the request queue.
pub(crate) const REQUEST_QUEUE_DEPTH: usize = 1;

/// Callback invoked with the raw device state read by a poll.
pub type PollCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A request waiting for the serializer.
pub(crate) enum PendingOperation {
    /// Write an encoded frame without response.
    Write(Frame),
    /// Read the device state and hand it to the callback.
    Poll(PollCallback),
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(frame) => write!(f, "Write({:02X?})", frame),
            Self::Poll(_) => write!(f, "Poll"),
        }
    }
}

/// Which steady-state operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A command write.
    Write,
    /// A state read for a poller.
    Read,
    /// The disconnect issued on shutdown.
    Disconnect,
}

/// A failure that happened after the session became ready.
///
/// These never terminate the session on their own. They are logged and published
/// on [`Session::subscribe_errors`](crate::Session::subscribe_errors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    /// The operation that failed.
    pub kind: OperationKind,
    /// Description of the underlying radio error.
    pub message: String,
}

/// Owner of the connection and characteristic for the lifetime of a ready session.
pub(crate) struct Serializer {
    connection: Box<dyn Connection>,
    characteristic: Box<dyn Characteristic>,
    requests: mpsc::Receiver<PendingOperation>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
    errors: broadcast::Sender<OperationError>,
    write_error_limit: Option<u32>,
    consecutive_write_errors: u32,
}

impl Serializer {
    pub(crate) fn new(
        connection: Box<dyn Connection>,
        characteristic: Box<dyn Characteristic>,
        requests: mpsc::Receiver<PendingOperation>,
        cancel: CancellationToken,
        state: Arc<StateCell>,
        errors: broadcast::Sender<OperationError>,
        write_error_limit: Option<u32>,
    ) -> Self {
        Self {
            connection,
            characteristic,
            requests,
            cancel,
            state,
            errors,
            write_error_limit,
            consecutive_write_errors: 0,
        }
    }

    /// Service requests until cancelled, then disconnect.
    pub(crate) async fn run(mut self) {
        debug!("Serializer started");

        loop {
            let operation = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                operation = self.requests.recv() => match operation {
                    Some(operation) => operation,
                    None => {
                        debug!("All request senders dropped");
                        break;
                    }
                },
            };

            self.execute(operation).await;
        }

        self.shutdown().await;
    }

    async fn execute(&mut self, operation: PendingOperation) {
        trace!("Executing {:?}", operation);

        match operation {
            PendingOperation::Write(frame) => {
                match self.characteristic.write_without_response(&frame).await {
                    Ok(()) => self.consecutive_write_errors = 0,
                    Err(e) => self.write_failed(&frame, e),
                }
            }
            PendingOperation::Poll(callback) => {
                let mut buf = [0u8; STATE_READ_LEN];
                match self.characteristic.read(&mut buf).await {
                    Ok(count) => {
                        let count = count.min(STATE_READ_LEN);
                        trace!("Read device state: {:02X?}", &buf[..count]);
                        callback(&buf[..count]);
                    }
                    Err(e) => {
                        warn!("Unable to read device state, skipping poll: {}", e);
                        self.report(OperationKind::Read, &e);
                    }
                }
            }
        }
    }

    fn write_failed(&mut self, frame: &Frame, e: Error) {
        warn!("Failed to write command {:02X?}: {}", frame, e);
        self.report(OperationKind::Write, &e);

        self.consecutive_write_errors += 1;
        if let Some(limit) = self.write_error_limit {
            if self.consecutive_write_errors >= limit {
                warn!(
                    "Closing session after {} consecutive write failures",
                    self.consecutive_write_errors
                );
                self.cancel.cancel();
            }
        }
    }

    fn report(&self, kind: OperationKind, e: &Error) {
        let _ = self.errors.send(OperationError {
            kind,
            message: e.to_string(),
        });
    }

    async fn shutdown(&mut self) {
        // Refuse new requests; anything still queued is dropped.
        self.requests.close();
        self.state.transition(SessionState::Closing);

        info!("Stopping device communication");

        if let Err(e) = self.connection.disconnect().await {
            warn!("Disconnect failed: {}", e);
            self.report(OperationKind::Disconnect, &e);
        }

        self.state.transition(SessionState::Closed);
        debug!("Serializer stopped");
    }
}

/// Periodically queue a poll, first at `start`, until `cancel` fires or the queue closes.
pub(crate) async fn run_poller(
    id: u64,
    start: Instant,
    interval: Duration,
    callback: PollCallback,
    requests: mpsc::Sender<PendingOperation>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Poller {} started, interval {:?}", id, interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = requests.send(PendingOperation::Poll(callback.clone())) => sent.is_ok(),
        };

        if !queued {
            break;
        }
    }

    debug!("Poller {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::radio::{MockCharacteristic, MockConnection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ready_state() -> Arc<StateCell> {
        let state = Arc::new(StateCell::new());
        for next in [
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::DiscoveringService,
            SessionState::DiscoveringCharacteristic,
            SessionState::Ready,
        ] {
            assert!(state.transition(next));
        }
        state
    }

    fn disconnecting_once() -> MockConnection {
        let mut connection = MockConnection::new();
        connection.expect_disconnect().times(1).returning(|| Ok(()));
        connection
    }

    struct Harness {
        tx: mpsc::Sender<PendingOperation>,
        cancel: CancellationToken,
        state: Arc<StateCell>,
        errors: broadcast::Receiver<OperationError>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(
        connection: MockConnection,
        characteristic: MockCharacteristic,
        write_error_limit: Option<u32>,
    ) -> Harness {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (error_tx, errors) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let state = ready_state();

        let serializer = Serializer::new(
            Box::new(connection),
            Box::new(characteristic),
            rx,
            cancel.clone(),
            state.clone(),
            error_tx,
            write_error_limit,
        );

        Harness {
            tx,
            cancel,
            state,
            errors,
            task: tokio::spawn(serializer.run()),
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_and_not_fatal() {
        let mut characteristic = MockCharacteristic::new();
        characteristic
            .expect_write_without_response()
            .times(2)
            .returning(|_| Err(Error::Internal("link busy".to_string())));

        let mut h = start(disconnecting_once(), characteristic, None);

        for _ in 0..2 {
            h.tx.send(PendingOperation::Write([0; 9])).await.unwrap();
        }

        for _ in 0..2 {
            let error = h.errors.recv().await.unwrap();
            assert_eq!(error.kind, OperationKind::Write);
            assert!(error.message.contains("link busy"));
        }
        assert_eq!(h.state.get(), SessionState::Ready);

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(h.state.get(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_failed_read_skips_callback() {
        let mut characteristic = MockCharacteristic::new();
        characteristic
            .expect_read()
            .times(1)
            .returning(|_| Err(Error::Internal("gatt error".to_string())));

        let mut h = start(disconnecting_once(), characteristic, None);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: PollCallback = Arc::new(move |_: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        h.tx.send(PendingOperation::Poll(callback)).await.unwrap();

        let error = h.errors.recv().await.unwrap();
        assert_eq!(error.kind, OperationKind::Read);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.state.get().is_ready());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_receives_bytes_read() {
        let mut characteristic = MockCharacteristic::new();
        characteristic.expect_read().times(1).returning(|buf: &mut [u8]| {
            buf[..4].copy_from_slice(&[0x66, 0x15, 0x23, 0x41]);
            Ok(4)
        });

        let h = start(disconnecting_once(), characteristic, None);

        let (state_tx, mut state_rx) = mpsc::unbounded_channel();
        let callback: PollCallback = Arc::new(move |state: &[u8]| {
            let _ = state_tx.send(state.to_vec());
        });
        h.tx.send(PendingOperation::Poll(callback)).await.unwrap();

        assert_eq!(state_rx.recv().await.unwrap(), vec![0x66, 0x15, 0x23, 0x41]);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_error_limit_closes_session() {
        let mut characteristic = MockCharacteristic::new();
        characteristic
            .expect_write_without_response()
            .times(3)
            .returning(|_| Err(Error::Internal("out of range".to_string())));

        let h = start(disconnecting_once(), characteristic, Some(3));

        for _ in 0..3 {
            h.tx.send(PendingOperation::Write([0; 9])).await.unwrap();
        }

        h.task.await.unwrap();
        assert!(h.cancel.is_cancelled());
        assert_eq!(h.state.get(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_successful_write_resets_error_count() {
        let mut characteristic = MockCharacteristic::new();
        let mut seq = mockall::Sequence::new();
        for fails in [true, false, true] {
            characteristic
                .expect_write_without_response()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| {
                    if fails {
                        Err(Error::Internal("dropped".to_string()))
                    } else {
                        Ok(())
                    }
                });
        }

        let mut h = start(disconnecting_once(), characteristic, Some(2));

        for _ in 0..3 {
            h.tx.send(PendingOperation::Write([0; 9])).await.unwrap();
        }
        for _ in 0..2 {
            h.errors.recv().await.unwrap();
        }

        assert!(!h.cancel.is_cancelled());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_closes() {
        let mut connection = MockConnection::new();
        connection
            .expect_disconnect()
            .times(1)
            .returning(|| Err(Error::Internal("already gone".to_string())));

        let mut h = start(connection, MockCharacteristic::new(), None);
        h.cancel.cancel();
        h.task.await.unwrap();

        assert_eq!(h.errors.recv().await.unwrap().kind, OperationKind::Disconnect);
        assert_eq!(h.state.get(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let callback: PollCallback = Arc::new(|_: &[u8]| {});

        let poller = tokio::spawn(run_poller(
            7,
            Instant::now() + Duration::from_secs(30),
            Duration::from_secs(30),
            callback,
            tx,
            cancel.clone(),
        ));

        let start = Instant::now();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PendingOperation::Poll(_)));
        assert!(start.elapsed() >= Duration::from_secs(30));

        cancel.cancel();
        poller.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
