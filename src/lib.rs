// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # bledom-rust-ble
//!
//! A cross-platform Rust library for driving ELK-BLEDOM RGB LED strip
//! controllers via Bluetooth Low Energy.
//!
//! The controllers are cheap, write-mostly devices: they accept fixed 9-byte
//! command frames on a single characteristic and expose an opaque state blob
//! on the same characteristic.
//!
//! ## Features
//!
//! - **Discovery**: Connect to the first controller advertising an `ELK` name
//! - **Colour and Brightness**: Encode and send RGB and brightness commands
//! - **State Polling**: Periodically read the raw device state
//! - **Serialized Access**: Commands and polls never overlap on the radio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bledom_rust_ble::{BrightnessCommand, ColourCommand, Result, Session, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::new(SessionConfig::default()).await?;
//!     session.connect(Duration::from_secs(30)).await?;
//!
//!     session.submit_command(ColourCommand::new(0xFF, 0x40, 0x00)).await?;
//!     session.submit_command(BrightnessCommand::new(60)).await?;
//!
//!     session.stop();
//!     session.wait_for_termination().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for commands and connection parameters

// Public modules
pub mod ble;
pub mod error;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use error::{Error, Result};
pub use session::{
    FailureKind, OperationError, OperationKind, PollerHandle, Session, SessionConfig, SessionState,
};

// Re-export commonly used types from submodules
pub use ble::{Advertisement, BtleplugRadio, ConnectionParams, Radio};
pub use protocol::{encode, BrightnessCommand, ColourCommand, Command, Frame};
