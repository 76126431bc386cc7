//! GATT characteristic access over btleplug.

use async_trait::async_trait;
use btleplug::api::{Characteristic as BtleCharacteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use tracing::trace;
use uuid::Uuid;

use crate::ble::radio::Characteristic;
use crate::error::{Error, Result};

/// A characteristic on a connected btleplug peripheral.
pub struct BtleplugCharacteristic {
    peripheral: Peripheral,
    characteristic: BtleCharacteristic,
}

impl BtleplugCharacteristic {
    /// Create a handle for `characteristic` on `peripheral`.
    pub fn new(peripheral: Peripheral, characteristic: BtleCharacteristic) -> Self {
        Self {
            peripheral,
            characteristic,
        }
    }
}

#[async_trait]
impl Characteristic for BtleplugCharacteristic {
    fn uuid(&self) -> Uuid {
        self.characteristic.uuid
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let data = self
            .peripheral
            .read(&self.characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        let count = copy_truncated(&data, buf);

        trace!(
            "Read {} bytes from characteristic {} ({} available)",
            count,
            self.characteristic.uuid,
            data.len()
        );

        Ok(count)
    }

    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!(
            "Wrote {} bytes to characteristic {}",
            data.len(),
            self.characteristic.uuid
        );

        Ok(())
    }
}

/// Copy as much of `data` as fits into `buf`, returning the count copied.
fn copy_truncated(data: &[u8], buf: &mut [u8]) -> usize {
    let count = data.len().min(buf.len());
    buf[..count].copy_from_slice(&data[..count]);
    count
}
