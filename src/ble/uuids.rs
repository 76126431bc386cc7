//! BLE Service and Characteristic UUIDs.
//!
//! Contains the fixed protocol constants used for ELK-BLEDOM communication.
//! The UUIDs were sourced from the vendor's Android application.

use uuid::Uuid;

/// Vendor LED control service UUID.
pub const LED_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_fff0_0000_1000_8000_00805f9b34fb);

/// LED command characteristic UUID (Read, Write Without Response).
pub const LED_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fff3_0000_1000_8000_00805f9b34fb);

/// Expected prefix of the advertised local name.
///
/// The controller advertises an HID service UUID rather than its real service,
/// so discovery has to match on the name. Both "ELK-" and "ELK_" are seen in the wild.
pub const DEVICE_NAME_PREFIX: &str = "ELK";

/// Number of bytes requested when reading device state.
pub const STATE_READ_LEN: usize = 16;

/// Check if an advertised local name belongs to an ELK-BLEDOM controller.
pub fn is_bledom_name(local_name: &str) -> bool {
    local_name.starts_with(DEVICE_NAME_PREFIX)
}
