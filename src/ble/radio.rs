//! Radio abstraction.
//!
//! The session never talks to a Bluetooth stack directly. It drives these traits,
//! which are implemented for btleplug by [`BtleplugRadio`](crate::ble::BtleplugRadio)
//! and can be implemented by callers for other stacks or for testing.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::is_bledom_name;
use crate::error::Result;

/// A single advertisement observed while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Radio address (or platform identifier) of the advertiser.
    pub address: String,
    /// Advertised local name, if one was broadcast.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Check whether this advertisement comes from an ELK-BLEDOM controller.
    pub fn is_bledom(&self) -> bool {
        self.local_name.as_deref().map(is_bledom_name).unwrap_or(false)
    }
}

/// Stream of advertisements produced by an active scan.
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// Parameters for the radio-level connection.
///
/// All fields are optional; `None` leaves the choice to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionParams {
    /// Upper bound on the radio-level connect.
    pub connection_timeout: Option<Duration>,
    /// Minimum connection interval.
    pub min_interval: Option<Duration>,
    /// Maximum connection interval.
    pub max_interval: Option<Duration>,
}

/// A Bluetooth adapter capable of scanning and connecting.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Make sure the adapter is powered and usable.
    async fn enable(&self) -> Result<()>;

    /// Start scanning and return the stream of advertisements.
    ///
    /// Dropping the stream does not stop the scan; call [`Radio::stop_scan`].
    async fn start_scan(&self) -> Result<AdvertisementStream>;

    /// Stop an active scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to the device with the given address.
    async fn connect(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<Box<dyn Connection>>;
}

/// An established connection to a device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Discover services matching `uuid`.
    async fn discover_services(&self, uuid: Uuid) -> Result<Vec<Box<dyn Service>>>;

    /// Disconnect from the device.
    async fn disconnect(&self) -> Result<()>;
}

/// A discovered GATT service.
#[async_trait]
pub trait Service: Send + Sync {
    /// UUID of the service.
    fn uuid(&self) -> Uuid;

    /// Discover characteristics matching `uuid` within this service.
    async fn discover_characteristics(&self, uuid: Uuid) -> Result<Vec<Box<dyn Characteristic>>>;
}

/// A discovered GATT characteristic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Characteristic: Send + Sync {
    /// UUID of the characteristic.
    fn uuid(&self) -> Uuid;

    /// Read the current value into `buf`, returning the number of bytes written.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write `data` without waiting for an acknowledgement.
    async fn write_without_response(&self, data: &[u8]) -> Result<()>;
}
