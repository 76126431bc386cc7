//! Session lifecycle states.

use std::fmt;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No matching advertisement before the scan deadline.
    ScanTimeout,
    /// The radio-level connect failed.
    ConnectError,
    /// The device does not expose the LED service.
    ServiceNotAvailable,
    /// The LED service lacks the command characteristic.
    CharacteristicNotAvailable,
    /// Any other radio error while connecting (adapter, scan or discovery).
    Radio,
    /// The session was stopped before it became ready.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanTimeout => write!(f, "scan timeout"),
            Self::ConnectError => write!(f, "connect error"),
            Self::ServiceNotAvailable => write!(f, "service not available"),
            Self::CharacteristicNotAvailable => write!(f, "characteristic not available"),
            Self::Radio => write!(f, "radio error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle state of a [`Session`](crate::Session).
///
/// States only ever move forward. `Ready` is the only state in which commands
/// and polls are serviced; `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Constructed, `connect` not yet called.
    #[default]
    Idle,
    /// Waiting for a matching advertisement.
    Scanning,
    /// Radio-level connect in progress.
    Connecting,
    /// Looking for the LED service.
    DiscoveringService,
    /// Looking for the command characteristic.
    DiscoveringCharacteristic,
    /// Connected and serving commands and polls.
    Ready,
    /// Stop requested, disconnect in progress.
    Closing,
    /// Disconnected after a stop.
    Closed,
    /// Connect failed.
    Failed(FailureKind),
}

impl SessionState {
    /// Check if the session is serving requests.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Scanning
                | Self::Connecting
                | Self::DiscoveringService
                | Self::DiscoveringCharacteristic
        )
    }

    /// Check if the session can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (Idle, Scanning) | (Idle, Closed) => true,
            (Scanning, Connecting) => true,
            (Connecting, DiscoveringService) => true,
            (DiscoveringService, DiscoveringCharacteristic) => true,
            (DiscoveringCharacteristic, Ready) => true,
            (Ready, Closing) => true,
            (Closing, Closed) => true,
            (from, Failed(_)) => from.is_connecting(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringService => write!(f, "DiscoveringService"),
            Self::DiscoveringCharacteristic => write!(f, "DiscoveringCharacteristic"),
            Self::Ready => write!(f, "Ready"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
            Self::Failed(kind) => write!(f, "Failed ({})", kind),
        }
    }
}

/// Observable state shared between the session handle and its tasks.
///
/// Every change goes through [`StateCell::transition`], which rejects illegal moves.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Idle);
        Self { tx }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next` if that is a legal transition from the current state.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut previous = None;
        let changed = self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match previous {
            Some(from) => debug!("Session state changed: {} -> {}", from, next),
            None => trace!("Rejected transition to {} from {}", next, self.get()),
        }

        changed
    }
}
