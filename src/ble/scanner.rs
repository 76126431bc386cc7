//! btleplug-backed radio.
//!
//! Provides the default [`Radio`] implementation: adapter selection, scanning
//! and connecting through the platform Bluetooth stack.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tracing::{debug, info, trace};

use crate::ble::connection::BtleplugConnection;
use crate::ble::radio::{Advertisement, AdvertisementStream, Connection, ConnectionParams, Radio};
use crate::error::{Error, Result};

/// [`Radio`] implementation on top of a btleplug adapter.
#[derive(Clone)]
pub struct BtleplugRadio {
    /// The BLE adapter used for scanning and connecting.
    adapter: Adapter,
}

impl BtleplugRadio {
    /// Create a radio on the first adapter reported by the platform.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a radio on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Resolve a peripheral id from a discovery event.
    fn event_peripheral_id(event: CentralEvent) -> Option<PeripheralId> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
            _ => None,
        }
    }

    /// Build an advertisement from a peripheral's cached properties.
    async fn advertisement(adapter: &Adapter, id: PeripheralId) -> Option<Advertisement> {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let advertisement = Advertisement {
            address: id.to_string(),
            local_name: properties.local_name,
            rssi: properties.rssi,
        };

        trace!(
            "Advertisement from {} ({:?}, rssi {:?})",
            advertisement.address,
            advertisement.local_name,
            advertisement.rssi
        );

        Some(advertisement)
    }

    /// Find a known peripheral by the address reported in its advertisement.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == address)
            .ok_or_else(|| Error::Internal(format!("Peripheral {} is no longer known", address)))
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    async fn enable(&self) -> Result<()> {
        // btleplug cannot power an adapter on; treat an unreachable adapter as unavailable.
        self.adapter
            .adapter_info()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;
        Ok(())
    }

    async fn start_scan(&self) -> Result<AdvertisementStream> {
        // Subscribe before starting so no early advertisement is missed.
        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        info!("Starting BLE scan for LED controllers");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        let adapter = self.adapter.clone();
        let adverts = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let id = Self::event_peripheral_id(event)?;
                Self::advertisement(&adapter, id).await
            }
        });

        Ok(adverts.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn connect(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<Box<dyn Connection>> {
        let peripheral = self.find_peripheral(address).await?;

        if params.min_interval.is_some() || params.max_interval.is_some() {
            debug!("Connection intervals are managed by the platform; ignoring requested values");
        }

        let connect = peripheral.connect();
        match params.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_elapsed| Error::Timeout)?
                .map_err(Error::Bluetooth)?,
            None => connect.await.map_err(Error::Bluetooth)?,
        }

        info!("Connected to {}", address);

        Ok(Box::new(BtleplugConnection::new(peripheral)))
    }
}
