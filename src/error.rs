//! Error types for the bledom-rust-ble crate.

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No advertisement with the expected name prefix was seen before the deadline.
    #[error("Timed out after {timeout:?} attempting to discover device")]
    ScanTimeout {
        /// The scan deadline that elapsed.
        timeout: Duration,
    },

    /// The radio-level connection to the matched device failed.
    #[error("Connection to {address} failed: {source}")]
    ConnectionFailed {
        /// Address of the device that was matched during scanning.
        address: String,
        /// The underlying radio error.
        #[source]
        source: Box<Error>,
    },

    /// The connected device does not implement the expected service.
    #[error("Device does not implement required service: {uuid}")]
    ServiceNotAvailable {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// The service is present but the expected characteristic is not.
    #[error("Unable to access required characteristic on device: {uuid}")]
    CharacteristicNotAvailable {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The operation is not valid in the session's current state.
    #[error("Operation not valid while session is {state}")]
    InvalidState {
        /// The state the session was in when the operation was attempted.
        state: SessionState,
    },

    /// The session has been stopped and no longer accepts requests.
    #[error("Session closed")]
    SessionClosed,

    /// The session was stopped while a connection attempt was in progress.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// The radio-level connect did not complete within the configured connection timeout.
    #[error("Radio operation timed out")]
    Timeout,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
