use alloc::sync::Arc;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};

use crate::cache::BlockCache;
use crate::command::Priority;
use crate::error::BusError;
use crate::queue::{BusQueue, UpdateListener};

/// Register ceiling of a single holding-register read.
pub const MAX_READ_REGISTERS: usize = 125;
/// Register ceiling of a single multiple-register write.
pub const MAX_WRITE_REGISTERS: usize = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FacadeConfig {
    /// Maximum age of a cached block that may answer a read. Zero turns the
    /// cache off.
    pub cache_ttl: Duration,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self { cache_ttl: Duration::from_ticks(0) }
    }
}

fn check_span(
    address: u16,
    length: usize,
    ceiling: usize,
) -> Result<u16, BusError> {
    if length == 0 || length > ceiling {
        return Err(BusError::InvalidLength(length));
    }
    if usize::from(address) + length - 1 > usize::from(u16::MAX) {
        return Err(BusError::AddressOverflow { address, length });
    }
    // `ceiling` is below u16::MAX, so the cast is lossless.
    Ok(length as u16)
}

/// Register access for one device.
///
/// Reads and writes go through the shared [`BusQueue`] of the device's bus;
/// the optional block cache is private to this instance.
pub struct Registers<M: RawMutex> {
    bus: Arc<BusQueue<M>>,
    config: FacadeConfig,
    cache: BlockCache,
}

impl<M: RawMutex> Registers<M> {
    pub fn new(bus: Arc<BusQueue<M>>, config: FacadeConfig) -> Self {
        Self { bus, config, cache: BlockCache::new() }
    }

    pub fn bus(&self) -> &Arc<BusQueue<M>> {
        &self.bus
    }

    fn cache_enabled(&self) -> bool {
        self.config.cache_ttl > Duration::from_ticks(0)
    }

    /// Read `length` holding registers at `address`.
    pub async fn read(
        &mut self,
        address: u16,
        length: usize,
    ) -> Result<Vec<u16>, BusError> {
        let length = check_span(address, length, MAX_READ_REGISTERS)?;

        if self.cache_enabled() {
            let hit = self.cache.lookup(
                address,
                length,
                Instant::now(),
                self.config.cache_ttl,
            );
            if let Some(words) = hit {
                trace!("cache hit {}+{}", address, length);
                return Ok(words);
            }
        }

        let words = self
            .bus
            .enqueue_read(address, length, Priority::POLL)
            .wait()
            .await?;

        if self.cache_enabled() {
            self.cache.store(address, &words, Instant::now());
        }
        Ok(words)
    }

    /// Write `values` to consecutive registers starting at `address`.
    ///
    /// On success the cache is patched and a bus-wide "registers updated"
    /// broadcast is scheduled one settle delay later. On failure nothing is
    /// assumed to have changed.
    pub async fn write(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), BusError> {
        check_span(address, values.len(), MAX_WRITE_REGISTERS)?;

        self.bus
            .enqueue_write(address, values.to_vec(), Priority::COMMAND)
            .wait()
            .await?;

        self.cache.patch(address, values);
        let now = Instant::now();
        self.bus.record_write(now);
        let due = now
            .checked_add(self.bus.config().settle_delay())
            .unwrap_or(Instant::MAX);
        self.bus.schedule_update(due);
        Ok(())
    }

    /// Subscribe to the bus-wide "registers updated" broadcast.
    pub fn listener(&self) -> UpdateListener<'_, M> {
        self.bus.listener()
    }

    /// Forget every cached block.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}
