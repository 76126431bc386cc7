//! In-memory radio used by the crate's tests.
//!
//! Records every characteristic operation and counts operations that overlap.

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::radio::{
    Advertisement, AdvertisementStream, Characteristic, Connection, ConnectionParams, Radio,
    Service,
};
use crate::error::{Error, Result};

/// A characteristic operation as seen by the fake device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operation {
    Write(Vec<u8>),
    Read,
}

/// Everything the fake radio observed.
#[derive(Debug, Default)]
pub(crate) struct RadioLog {
    pub operations: Mutex<Vec<Operation>>,
    pub adverts_seen: AtomicUsize,
    pub scan_stops: AtomicUsize,
    pub connected_to: Mutex<Option<String>>,
    pub disconnects: AtomicUsize,
    pub overlaps: AtomicUsize,
    in_flight: AtomicBool,
}

impl RadioLog {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.operations
            .lock()
            .iter()
            .filter_map(|op| match op {
                Operation::Write(data) => Some(data.clone()),
                Operation::Read => None,
            })
            .collect()
    }

    pub fn reads(&self) -> usize {
        self.operations
            .lock()
            .iter()
            .filter(|op| matches!(op, Operation::Read))
            .count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn begin(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end(&self, operation: Operation) {
        self.operations.lock().push(operation);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct Behaviour {
    fail_connect: bool,
    services: usize,
    characteristics: usize,
    fail_writes: bool,
    fail_reads: bool,
    state: Vec<u8>,
    op_delay: Duration,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            fail_connect: false,
            services: 1,
            characteristics: 1,
            fail_writes: false,
            fail_reads: false,
            state: (0..16).collect(),
            op_delay: Duration::from_millis(1),
        }
    }
}

/// Fake [`Radio`] fed with advertisements by the test.
pub(crate) struct FakeRadio {
    advert_tx: UnboundedSender<Advertisement>,
    advert_rx: Mutex<Option<UnboundedReceiver<Advertisement>>>,
    behaviour: Behaviour,
    log: Arc<RadioLog>,
}

impl FakeRadio {
    pub fn new() -> Self {
        let (advert_tx, advert_rx) = unbounded();
        Self {
            advert_tx,
            advert_rx: Mutex::new(Some(advert_rx)),
            behaviour: Behaviour::default(),
            log: Arc::new(RadioLog::default()),
        }
    }

    pub fn with_services(mut self, count: usize) -> Self {
        self.behaviour.services = count;
        self
    }

    pub fn with_characteristics(mut self, count: usize) -> Self {
        self.behaviour.characteristics = count;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.behaviour.fail_connect = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.behaviour.fail_writes = true;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.behaviour.fail_reads = true;
        self
    }

    pub fn with_state(mut self, state: &[u8]) -> Self {
        self.behaviour.state = state.to_vec();
        self
    }

    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.behaviour.op_delay = delay;
        self
    }

    pub fn log(&self) -> Arc<RadioLog> {
        self.log.clone()
    }

    /// Queue an advertisement; it is delivered once scanning starts.
    pub fn advertise(&self, address: &str, local_name: &str) {
        let _ = self.advert_tx.unbounded_send(Advertisement {
            address: address.to_string(),
            local_name: Some(local_name.to_string()),
            rssi: Some(-55),
        });
    }
}

#[async_trait]
impl Radio for FakeRadio {
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    async fn start_scan(&self) -> Result<AdvertisementStream> {
        let rx = self
            .advert_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("scan already started".to_string()))?;

        let log = self.log.clone();
        Ok(rx
            .inspect(move |_| {
                log.adverts_seen.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.log.scan_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(
        &self,
        address: &str,
        _params: &ConnectionParams,
    ) -> Result<Box<dyn Connection>> {
        if self.behaviour.fail_connect {
            return Err(Error::BluetoothUnavailable);
        }

        *self.log.connected_to.lock() = Some(address.to_string());

        Ok(Box::new(FakeConnection {
            behaviour: self.behaviour.clone(),
            log: self.log.clone(),
        }))
    }
}

struct FakeConnection {
    behaviour: Behaviour,
    log: Arc<RadioLog>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn discover_services(&self, uuid: Uuid) -> Result<Vec<Box<dyn Service>>> {
        Ok((0..self.behaviour.services)
            .map(|_| {
                Box::new(FakeService {
                    uuid,
                    behaviour: self.behaviour.clone(),
                    log: self.log.clone(),
                }) as Box<dyn Service>
            })
            .collect())
    }

    async fn disconnect(&self) -> Result<()> {
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeService {
    uuid: Uuid,
    behaviour: Behaviour,
    log: Arc<RadioLog>,
}

#[async_trait]
impl Service for FakeService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn discover_characteristics(&self, uuid: Uuid) -> Result<Vec<Box<dyn Characteristic>>> {
        Ok((0..self.behaviour.characteristics)
            .map(|_| {
                Box::new(FakeCharacteristic {
                    uuid,
                    behaviour: self.behaviour.clone(),
                    log: self.log.clone(),
                }) as Box<dyn Characteristic>
            })
            .collect())
    }
}

struct FakeCharacteristic {
    uuid: Uuid,
    behaviour: Behaviour,
    log: Arc<RadioLog>,
}

#[async_trait]
impl Characteristic for FakeCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.log.begin();
        tokio::time::sleep(self.behaviour.op_delay).await;
        self.log.end(Operation::Read);

        if self.behaviour.fail_reads {
            return Err(Error::Internal("read failed".to_string()));
        }

        let count = self.behaviour.state.len().min(buf.len());
        buf[..count].copy_from_slice(&self.behaviour.state[..count]);
        Ok(count)
    }

    async fn write_without_response(&self, data: &[u8]) -> Result<()> {
        self.log.begin();
        tokio::time::sleep(self.behaviour.op_delay).await;
        self.log.end(Operation::Write(data.to_vec()));

        if self.behaviour.fail_writes {
            return Err(Error::Internal("write failed".to_string()));
        }
        Ok(())
    }
}
