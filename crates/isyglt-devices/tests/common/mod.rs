#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use isyglt_devices::Device;
use isyglt_icd::{DeviceConfig, HubConfig};
use modbus_queue::{
    BusConfig, BusId, BusQueue, FacadeConfig, Registers, Transport,
    TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read(u16, u16),
    Write(u16, Vec<u16>),
}

#[derive(Default)]
struct Field {
    registers: BTreeMap<u16, u16>,
    calls: Vec<Call>,
    offline: bool,
    reject_writes: bool,
}

/// Register map of the devices behind one hub.
#[derive(Clone, Default)]
pub struct FieldBus {
    field: Arc<Mutex<Field>>,
}

impl FieldBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: u16, values: &[u16]) {
        let mut field = self.field.lock().unwrap();
        for (i, value) in values.iter().enumerate() {
            field.registers.insert(address + i as u16, *value);
        }
    }

    pub fn get(&self, address: u16) -> u16 {
        let field = self.field.lock().unwrap();
        field.registers.get(&address).copied().unwrap_or(0)
    }

    pub fn words(&self, address: u16, count: u16) -> Vec<u16> {
        (address..address + count).map(|a| self.get(a)).collect()
    }

    pub fn set_offline(&self, offline: bool) {
        self.field.lock().unwrap().offline = offline;
    }

    pub fn reject_writes(&self, reject: bool) {
        self.field.lock().unwrap().reject_writes = reject;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.field.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Write(..)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.field.lock().unwrap().calls.clear();
    }
}

impl Transport for FieldBus {
    async fn read_holding(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        yield_now().await;
        {
            let mut field = self.field.lock().unwrap();
            field.calls.push(Call::Read(address, count));
            if field.offline {
                return Err(TransportError::NoResponse);
            }
        }
        Ok(self.words(address, count))
    }

    async fn write_holding(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        yield_now().await;
        {
            let mut field = self.field.lock().unwrap();
            field.calls.push(Call::Write(address, values.to_vec()));
            if field.offline {
                return Err(TransportError::NoResponse);
            }
            if field.reject_writes {
                return Err(TransportError::Exception(4));
            }
        }
        self.set(address, values);
        Ok(())
    }
}

pub type Queue = BusQueue<NoopRawMutex>;

pub fn hub(poll_secs: f64, devices: Vec<DeviceConfig>) -> HubConfig {
    let mut hub = HubConfig::new("hub", devices);
    hub.poll_interval = poll_secs;
    hub
}

pub fn make_queue(hub: &HubConfig) -> Arc<Queue> {
    Arc::new(BusQueue::new(
        BusId::new(&hub.hub).unwrap(),
        BusConfig { poll_interval: hub.poll_interval() },
    ))
}

pub fn device(
    hub: &HubConfig,
    queue: &Arc<Queue>,
    index: usize,
) -> Device<NoopRawMutex> {
    let regs = Registers::new(queue.clone(), FacadeConfig::default());
    Device::new(hub, hub.devices[index].clone(), regs)
}

/// Run `body` while the bus worker serves `queue` from `field`.
pub async fn drive<F: Future>(
    queue: &Queue,
    field: &FieldBus,
    body: F,
) -> F::Output {
    match select(queue.run(field.clone()), body).await {
        Either::First(()) => panic!("bus worker exited"),
        Either::Second(output) => output,
    }
}
