//! Session configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::ble::radio::{ConnectionParams, Radio};

/// Configuration for a [`Session`](crate::Session).
///
/// # Example
///
/// ```
/// use bledom_rust_ble::{ConnectionParams, SessionConfig};
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_scan_timeout(Duration::from_secs(20))
///     .with_connection_params(ConnectionParams {
///         connection_timeout: Some(Duration::from_secs(10)),
///         ..Default::default()
///     })
///     .with_write_error_limit(5);
///
/// assert_eq!(config.scan_timeout(), Duration::from_secs(20));
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    radio: Option<Arc<dyn Radio>>,
    connection_params: ConnectionParams,
    scan_timeout: Duration,
    write_error_limit: Option<u32>,
}

impl SessionConfig {
    /// Default scan timeout (60 seconds).
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

    /// Use a specific radio instead of the first btleplug adapter.
    pub fn with_radio(mut self, radio: Arc<dyn Radio>) -> Self {
        self.radio = Some(radio);
        self
    }

    /// Set the parameters passed to the radio-level connect.
    pub fn with_connection_params(mut self, params: ConnectionParams) -> Self {
        self.connection_params = params;
        self
    }

    /// Set the timeout used by [`Session::connect_default`](crate::Session::connect_default).
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Close the session after `limit` consecutive failed writes.
    ///
    /// A limit of 0 disables the cut-off, same as never calling this.
    pub fn with_write_error_limit(mut self, limit: u32) -> Self {
        self.write_error_limit = (limit > 0).then_some(limit);
        self
    }

    /// The configured radio, if any.
    pub fn radio(&self) -> Option<&Arc<dyn Radio>> {
        self.radio.as_ref()
    }

    /// Connection parameters.
    pub fn connection_params(&self) -> &ConnectionParams {
        &self.connection_params
    }

    /// Scan timeout.
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    /// Consecutive write failure limit.
    pub fn write_error_limit(&self) -> Option<u32> {
        self.write_error_limit
    }

    pub(crate) fn take_radio(&mut self) -> Option<Arc<dyn Radio>> {
        self.radio.take()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            radio: None,
            connection_params: ConnectionParams::default(),
            scan_timeout: Self::DEFAULT_SCAN_TIMEOUT,
            write_error_limit: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("radio", &self.radio.as_ref().map(|_| "<radio>"))
            .field("connection_params", &self.connection_params)
            .field("scan_timeout", &self.scan_timeout)
            .field("write_error_limit", &self.write_error_limit)
            .finish()
    }
}
