#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use modbus_queue::{BusConfig, BusId, BusQueue, Transport, TransportError};

// ---------------------------------------------------------------------------
// Mock transport
// ---------------------------------------------------------------------------

/// One transaction as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read(u16, u16),
    Write(u16, Vec<u16>),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    registers: BTreeMap<u16, u16>,
    /// Consumed in order, one per transaction.
    fail_next: VecDeque<TransportError>,
    /// Reads starting at these addresses always fail.
    fail_reads_at: BTreeMap<u16, TransportError>,
    /// Return at most this many words per read.
    truncate_reads: Option<usize>,
    overlaps: usize,
}

/// In-memory register file that records every transaction and notices when
/// two of them overlap.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    busy: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: u16, value: u16) {
        self.state.lock().unwrap().registers.insert(address, value);
    }

    pub fn get(&self, address: u16) -> u16 {
        self.state
            .lock()
            .unwrap()
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_next(&self, err: TransportError) {
        self.state.lock().unwrap().fail_next.push_back(err);
    }

    pub fn fail_reads_at(&self, address: u16, err: TransportError) {
        self.state.lock().unwrap().fail_reads_at.insert(address, err);
    }

    pub fn truncate_reads(&self, max: usize) {
        self.state.lock().unwrap().truncate_reads = Some(max);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn overlaps(&self) -> usize {
        self.state.lock().unwrap().overlaps
    }

    fn enter(&self, call: Call) -> Option<TransportError> {
        let mut state = self.state.lock().unwrap();
        if self.busy.swap(true, Ordering::SeqCst) {
            state.overlaps += 1;
        }
        let address = match &call {
            Call::Read(address, _) => Some(*address),
            Call::Write(..) => None,
        };
        state.calls.push(call);
        if let Some(err) = state.fail_next.pop_front() {
            return Some(err);
        }
        address.and_then(|a| state.fail_reads_at.get(&a).copied())
    }

    fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Give the other futures on the executor a chance to run while a
    /// transaction is on the wire.
    async fn on_the_wire() {
        for _ in 0..3 {
            yield_now().await;
        }
    }
}

impl Transport for MockTransport {
    async fn read_holding(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let failure = self.enter(Call::Read(address, count));
        Self::on_the_wire().await;
        let result = match failure {
            Some(err) => Err(err),
            None => {
                let state = self.state.lock().unwrap();
                let mut words: Vec<u16> = (0..count)
                    .map(|i| {
                        state
                            .registers
                            .get(&(address + i))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
                if let Some(max) = state.truncate_reads {
                    words.truncate(max);
                }
                Ok(words)
            }
        };
        self.leave();
        result
    }

    async fn write_holding(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let failure = self.enter(Call::Write(address, values.to_vec()));
        Self::on_the_wire().await;
        let result = match failure {
            Some(err) => Err(err),
            None => {
                let mut state = self.state.lock().unwrap();
                for (i, value) in values.iter().enumerate() {
                    state.registers.insert(address + i as u16, *value);
                }
                Ok(())
            }
        };
        self.leave();
        result
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn make_queue<M: RawMutex>(poll_ms: u64) -> BusQueue<M> {
    BusQueue::new(
        BusId::new("hub").unwrap(),
        BusConfig {
            poll_interval: embassy_time::Duration::from_millis(poll_ms),
        },
    )
}

/// Run `body` while the bus worker drains `queue` against `transport`.
pub async fn drive<M: RawMutex, F: Future>(
    queue: &BusQueue<M>,
    transport: MockTransport,
    body: F,
) -> F::Output {
    match select(queue.run(transport), body).await {
        Either::First(()) => panic!("bus worker exited"),
        Either::Second(output) => output,
    }
}
