//! btleplug connection and service discovery.

use async_trait::async_trait;
use btleplug::api::{Peripheral as _, Service as BtleService};
use btleplug::platform::Peripheral;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::ble::characteristics::BtleplugCharacteristic;
use crate::ble::radio::{Characteristic, Connection, Service};
use crate::error::{Error, Result};

/// An established btleplug connection.
pub struct BtleplugConnection {
    /// The connected peripheral.
    peripheral: Peripheral,
}

impl BtleplugConnection {
    /// Wrap a connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }
}

#[async_trait]
impl Connection for BtleplugConnection {
    async fn discover_services(&self, uuid: Uuid) -> Result<Vec<Box<dyn Service>>> {
        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let services: Vec<Box<dyn Service>> = self
            .peripheral
            .services()
            .into_iter()
            .filter(|service| service.uuid == uuid)
            .map(|service| {
                debug!("Found service {}", service.uuid);
                Box::new(BtleplugService {
                    peripheral: self.peripheral.clone(),
                    service,
                }) as Box<dyn Service>
            })
            .collect();

        Ok(services)
    }

    async fn disconnect(&self) -> Result<()> {
        match self.peripheral.disconnect().await {
            Ok(_) => {
                info!("Successfully disconnected from device");
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }
}

/// A service discovered on a btleplug peripheral.
pub struct BtleplugService {
    peripheral: Peripheral,
    service: BtleService,
}

#[async_trait]
impl Service for BtleplugService {
    fn uuid(&self) -> Uuid {
        self.service.uuid
    }

    async fn discover_characteristics(&self, uuid: Uuid) -> Result<Vec<Box<dyn Characteristic>>> {
        // btleplug resolves characteristics together with their service.
        let characteristics = self
            .service
            .characteristics
            .iter()
            .filter(|characteristic| characteristic.uuid == uuid)
            .map(|characteristic| {
                debug!(
                    "Found characteristic: {} in service {}, properties: {:?}",
                    characteristic.uuid, self.service.uuid, characteristic.properties
                );
                Box::new(BtleplugCharacteristic::new(
                    self.peripheral.clone(),
                    characteristic.clone(),
                )) as Box<dyn Characteristic>
            })
            .collect();

        Ok(characteristics)
    }
}
