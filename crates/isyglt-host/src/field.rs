//! In-memory stand-in for the Modbus gateway of a hub.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modbus_queue::{Transport, TransportError};

#[derive(Default)]
struct Registers {
    words: BTreeMap<u16, u16>,
    offline: BTreeSet<u16>,
}

/// Holding registers of every device behind one gateway.
///
/// Clones share the same registers, so a test or the simulator can poke
/// values while the bus worker owns its own handle.
#[derive(Clone, Default)]
pub struct RegisterFile {
    registers: Arc<Mutex<Registers>>,
    latency: Duration,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl RegisterFile {
    pub fn new(latency: Duration) -> Self {
        Self { latency, ..Default::default() }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registers> {
        // A poisoned lock still holds consistent words.
        self.registers.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn set(&self, address: u16, values: &[u16]) {
        let mut registers = self.lock();
        for (offset, value) in (0u16..).zip(values) {
            if let Some(address) = address.checked_add(offset) {
                registers.words.insert(address, *value);
            }
        }
    }

    pub fn get(&self, address: u16) -> u16 {
        self.lock().words.get(&address).copied().unwrap_or(0)
    }

    /// Make every transaction touching `address` go unanswered.
    pub fn set_offline(&self, address: u16, offline: bool) {
        let mut registers = self.lock();
        if offline {
            registers.offline.insert(address);
        } else {
            registers.offline.remove(&address);
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn reachable(
        &self,
        address: u16,
        count: usize,
    ) -> Result<(), TransportError> {
        let end = u32::from(address) + count as u32;
        let registers = self.lock();
        match registers.offline.range(address..).next() {
            Some(&dead) if u32::from(dead) < end => {
                Err(TransportError::NoResponse)
            }
            _ => Ok(()),
        }
    }
}

impl Transport for RegisterFile {
    async fn read_holding(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        tokio::time::sleep(self.latency).await;
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.reachable(address, usize::from(count))?;

        let registers = self.lock();
        let words = (0..count)
            .map(|i| {
                let address = address.checked_add(i);
                address
                    .and_then(|a| registers.words.get(&a).copied())
                    .unwrap_or(0)
            })
            .collect();
        tracing::trace!("read {}+{} -> {:?}", address, count, words);
        Ok(words)
    }

    async fn write_holding(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        tokio::time::sleep(self.latency).await;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.reachable(address, values.len())?;

        tracing::trace!("write {} <- {:?}", address, values);
        self.set(address, values);
        Ok(())
    }
}
