use alloc::collections::{BTreeMap, BinaryHeap};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::cmp::Reverse;
use core::future::poll_fn;
use core::task::{Poll, Waker};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::{AtomicU32, Ordering};

use crate::command::{Command, CommandKind, Op, Priority};
use crate::completion::Completion;
use crate::error::BusError;
use crate::registry::BusId;
use crate::transport::Transport;

/// Per-bus settings fixed when the queue is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Poll cycle of the devices on this bus.
    pub poll_interval: Duration,
}

impl BusConfig {
    /// Time between a successful write and its "registers updated"
    /// broadcast: two poll cycles, so the field device has applied the
    /// change before anyone reads it back.
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn settle_delay(&self) -> Duration {
        self.poll_interval.checked_mul(2).unwrap_or(Duration::MAX)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(1) }
    }
}

struct State<M: RawMutex> {
    pending: BinaryHeap<Reverse<Command<M>>>,
    /// Reads queued or executing, keyed by `(address, length)`.
    in_flight: BTreeMap<(u16, u16), Completion<M, Vec<u16>>>,
    next_sequence: u64,
    broadcasts_due: BinaryHeap<Reverse<Instant>>,
    /// Broadcasts fired so far.
    broadcast_count: u32,
    /// Listeners waiting for the next broadcast.
    update_waiters: Vec<Waker>,
    last_write: Option<Instant>,
}

impl<M: RawMutex> State<M> {
    fn push(&mut self, priority: Priority, address: u16, op: Op<M>) {
        self.next_sequence += 1;
        self.pending.push(Reverse(Command {
            priority,
            sequence: self.next_sequence,
            address,
            op,
        }));
    }
}

/// Command queue for one physical bus.
///
/// Any number of producers enqueue reads and writes; a single worker started
/// with [`BusQueue::run`] drains them one at a time, lowest
/// `(priority, sequence)` first. Identical reads that are still in flight
/// share one transaction.
pub struct BusQueue<M: RawMutex> {
    id: BusId,
    config: BusConfig,
    state: Mutex<M, RefCell<State<M>>>,
    work: Signal<M, ()>,
    timers: Signal<M, ()>,
    executed: AtomicU32,
}

impl<M: RawMutex> BusQueue<M> {
    pub fn new(id: BusId, config: BusConfig) -> Self {
        Self {
            id,
            config,
            state: Mutex::new(RefCell::new(State {
                pending: BinaryHeap::new(),
                in_flight: BTreeMap::new(),
                next_sequence: 0,
                broadcasts_due: BinaryHeap::new(),
                broadcast_count: 0,
                update_waiters: Vec::new(),
                last_write: None,
            })),
            work: Signal::new(),
            timers: Signal::new(),
            executed: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &BusId {
        &self.id
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Queue a read of `length` registers at `address`.
    ///
    /// If the exact same `(address, length)` read is already queued or
    /// executing, its handle is returned and nothing new is scheduled.
    pub fn enqueue_read(
        &self,
        address: u16,
        length: u16,
        priority: Priority,
    ) -> Completion<M, Vec<u16>> {
        let done = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if let Some(existing) = state.in_flight.get(&(address, length)) {
                trace!(
                    "bus {}: read {}+{} attached to in-flight command",
                    self.id.as_str(),
                    address,
                    length
                );
                return existing.clone();
            }

            let done = Completion::new();
            state.in_flight.insert((address, length), done.clone());
            state.push(
                priority,
                address,
                Op::Read { length, done: done.clone() },
            );
            trace!(
                "bus {}: queued read {}+{} seq {}",
                self.id.as_str(),
                address,
                length,
                state.next_sequence
            );
            done
        });
        self.work.signal(());
        done
    }

    /// Queue a write of `values` starting at `address`. Writes are never
    /// merged.
    pub fn enqueue_write(
        &self,
        address: u16,
        values: Vec<u16>,
        priority: Priority,
    ) -> Completion<M, ()> {
        let done = Completion::new();
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            trace!(
                "bus {}: queued write {}+{} seq {}",
                self.id.as_str(),
                address,
                values.len(),
                state.next_sequence + 1
            );
            state.push(
                priority,
                address,
                Op::Write { values, done: done.clone() },
            );
        });
        self.work.signal(());
        done
    }

    /// Drive the bus: execute queued commands against `transport` and fire
    /// scheduled update broadcasts.
    ///
    /// Never returns. Run exactly one instance per queue; it is the only
    /// code that touches `transport`.
    pub async fn run<T: Transport>(&self, transport: T) {
        info!("bus {}: worker started", self.id.as_str());
        select(self.drain(transport), self.broadcast()).await;
    }

    async fn drain<T: Transport>(&self, mut transport: T) {
        loop {
            let command = self.next_command().await;
            self.execute(&mut transport, command).await;
        }
    }

    async fn next_command(&self) -> Command<M> {
        loop {
            let next =
                self.state.lock(|state| state.borrow_mut().pending.pop());
            if let Some(Reverse(command)) = next {
                return command;
            }
            self.work.wait().await;
        }
    }

    async fn execute<T: Transport>(
        &self,
        transport: &mut T,
        command: Command<M>,
    ) {
        let kind = command.kind();
        let address = command.address;
        trace!(
            "bus {}: executing {:?} at {} seq {}",
            self.id.as_str(),
            kind,
            address,
            command.sequence
        );
        self.executed.fetch_add(1, Ordering::Relaxed);

        match command.op {
            Op::Read { length, done } => {
                let read = transport.read_holding(address, length).await;
                let outcome = match read {
                    Ok(mut words) if words.len() >= usize::from(length) => {
                        words.truncate(usize::from(length));
                        Ok(words)
                    }
                    Ok(words) => Err(BusError::ShortResponse {
                        expected: length,
                        received: words.len(),
                    }),
                    Err(err) => Err(BusError::Transport(err)),
                };
                if let Err(err) = &outcome {
                    warn!(
                        "bus {}: read {}+{} failed: {}",
                        self.id.as_str(),
                        address,
                        length,
                        err
                    );
                }

                self.state.lock(|state| {
                    let mut state = state.borrow_mut();
                    let key = (address, length);
                    if state
                        .in_flight
                        .get(&key)
                        .is_some_and(|current| current.same_command(&done))
                    {
                        state.in_flight.remove(&key);
                    }
                });
                self.check_resolved(kind, done.resolve(outcome));
            }
            Op::Write { values, done } => {
                let outcome = transport
                    .write_holding(address, &values)
                    .await
                    .map_err(BusError::from);
                if let Err(err) = &outcome {
                    warn!(
                        "bus {}: write {}+{} failed: {}",
                        self.id.as_str(),
                        address,
                        values.len(),
                        err
                    );
                }
                self.check_resolved(kind, done.resolve(outcome));
            }
        }
    }

    fn check_resolved(&self, kind: CommandKind, resolved: bool) {
        if !resolved {
            error!(
                "bus {}: {:?} command resolved twice",
                self.id.as_str(),
                kind
            );
        }
    }

    /// Remember when the last successful write went out.
    pub fn record_write(&self, at: Instant) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.last_write.map_or(true, |last| at > last) {
                state.last_write = Some(at);
            }
        });
    }

    pub fn last_write(&self) -> Option<Instant> {
        self.state.lock(|state| state.borrow().last_write)
    }

    /// Schedule one "registers updated" broadcast at `at`.
    ///
    /// The broadcast is owned by the bus, not by the caller, and fires
    /// exactly once even if the caller is gone by then.
    pub fn schedule_update(&self, at: Instant) {
        self.state.lock(|state| {
            state.borrow_mut().broadcasts_due.push(Reverse(at));
        });
        self.timers.signal(());
    }

    async fn broadcast(&self) {
        loop {
            let due = self.state.lock(|state| {
                state.borrow().broadcasts_due.peek().map(|Reverse(at)| *at)
            });
            match due {
                None => self.timers.wait().await,
                Some(at) => {
                    // A newly scheduled, earlier deadline restarts the wait.
                    if let Either::First(()) =
                        select(Timer::at(at), self.timers.wait()).await
                    {
                        self.fire_due(Instant::now());
                    }
                }
            }
        }
    }

    fn fire_due(&self, now: Instant) {
        let fired = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let mut due = 0u32;
            while let Some(Reverse(at)) = state.broadcasts_due.peek() {
                if *at > now {
                    break;
                }
                state.broadcasts_due.pop();
                due += 1;
            }
            if due == 0 {
                return None;
            }
            state.broadcast_count = state.broadcast_count.wrapping_add(due);
            let waiters = core::mem::take(&mut state.update_waiters);
            Some((state.broadcast_count, due, waiters))
        });

        if let Some((count, due, waiters)) = fired {
            debug!(
                "bus {}: registers updated ({}, {} due, {} listening)",
                self.id.as_str(),
                count,
                due,
                waiters.len()
            );
            waiters.into_iter().for_each(Waker::wake);
        }
    }

    /// Subscribe to "registers updated" broadcasts. Only broadcasts fired
    /// after this call are reported.
    pub fn listener(&self) -> UpdateListener<'_, M> {
        UpdateListener { bus: self, seen: self.broadcasts() }
    }

    /// Commands queued and not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.state.lock(|state| state.borrow().pending.len())
    }

    /// Distinct reads currently queued or executing.
    pub fn in_flight_reads(&self) -> usize {
        self.state.lock(|state| state.borrow().in_flight.len())
    }

    /// Broadcasts waiting for their deadline.
    pub fn scheduled_updates(&self) -> usize {
        self.state.lock(|state| state.borrow().broadcasts_due.len())
    }

    /// Transactions handed to the transport so far.
    pub fn executed(&self) -> u32 {
        self.executed.load(Ordering::Relaxed)
    }

    /// "Registers updated" broadcasts fired so far.
    pub fn broadcasts(&self) -> u32 {
        self.state.lock(|state| state.borrow().broadcast_count)
    }
}

/// Receives the bus-wide "registers updated" broadcast.
///
/// A bus has no limit on the number of listeners.
pub struct UpdateListener<'a, M: RawMutex> {
    bus: &'a BusQueue<M>,
    seen: u32,
}

impl<M: RawMutex> UpdateListener<'_, M> {
    /// Wait for the next broadcast and return the bus broadcast count.
    ///
    /// Broadcasts that fire while nobody is waiting collapse into one.
    pub async fn changed(&mut self) -> u32 {
        poll_fn(|cx| {
            let count = self.bus.state.lock(|state| {
                let mut state = state.borrow_mut();
                if state.broadcast_count != self.seen {
                    return Some(state.broadcast_count);
                }
                let waker = cx.waker();
                if !state.update_waiters.iter().any(|w| w.will_wake(waker)) {
                    state.update_waiters.push(waker.clone());
                }
                None
            });
            match count {
                Some(count) => {
                    self.seen = count;
                    Poll::Ready(count)
                }
                None => Poll::Pending,
            }
        })
        .await
    }

    /// Return the broadcast count if one fired since the last check.
    pub fn try_changed(&mut self) -> Option<u32> {
        let count = self.bus.broadcasts();
        if count == self.seen {
            return None;
        }
        self.seen = count;
        Some(count)
    }
}
