//! BLE communication module.
//!
//! This module defines the radio abstraction the session is written against,
//! the fixed ELK-BLEDOM protocol constants, and the btleplug-backed default radio.

pub mod characteristics;
pub mod connection;
pub mod radio;
pub mod scanner;
pub mod uuids;

#[cfg(test)]
pub(crate) mod fake;

pub use characteristics::BtleplugCharacteristic;
pub use connection::{BtleplugConnection, BtleplugService};
pub use radio::{
    Advertisement, AdvertisementStream, Characteristic, Connection, ConnectionParams, Radio,
    Service,
};
pub use scanner::BtleplugRadio;
pub use uuids::*;
