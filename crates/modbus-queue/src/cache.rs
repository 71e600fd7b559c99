use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};

/// Registers per cache block. Stays below the 125 register read ceiling so a
/// block can always be fetched in one transaction.
pub const BLOCK_SIZE: u16 = 120;

struct Block {
    fetched_at: Instant,
    words: Vec<Option<u16>>,
}

impl Block {
    fn empty(fetched_at: Instant) -> Self {
        Self { fetched_at, words: vec![None; usize::from(BLOCK_SIZE)] }
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.checked_duration_since(self.fetched_at)
            .is_some_and(|age| age <= ttl)
    }
}

fn split(address: u16) -> (u16, usize) {
    let base = address / BLOCK_SIZE * BLOCK_SIZE;
    (base, usize::from(address - base))
}

/// Best-effort cache of confirmed register values, keyed by block base.
///
/// Only results of completed transactions and of successful local writes
/// land here. A miss always falls through to the bus.
#[derive(Default)]
pub struct BlockCache {
    blocks: BTreeMap<u16, Block>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `length` words at `address` if every one of them sits in a
    /// block younger than `ttl`.
    pub fn lookup(
        &self,
        address: u16,
        length: u16,
        now: Instant,
        ttl: Duration,
    ) -> Option<Vec<u16>> {
        (0..length)
            .map(|i| {
                let (base, offset) = split(address.checked_add(i)?);
                let block = self.blocks.get(&base)?;
                if !block.is_fresh(now, ttl) {
                    return None;
                }
                block.words[offset]
            })
            .collect()
    }

    /// Record words read from the bus at `now`.
    ///
    /// Older contents of a touched block are dropped so a block never mixes
    /// values of different ages.
    pub fn store(&mut self, address: u16, words: &[u16], now: Instant) {
        for (addr, word) in (address..=u16::MAX).zip(words) {
            let (base, offset) = split(addr);
            let block =
                self.blocks.entry(base).or_insert_with(|| Block::empty(now));
            if block.fetched_at != now {
                *block = Block::empty(now);
            }
            block.words[offset] = Some(*word);
        }
    }

    /// Overwrite already cached words with values just written.
    ///
    /// Words that were never read stay unknown.
    pub fn patch(&mut self, address: u16, values: &[u16]) {
        for (addr, value) in (address..=u16::MAX).zip(values) {
            let (base, offset) = split(addr);
            if let Some(slot) = self
                .blocks
                .get_mut(&base)
                .and_then(|block| block.words[offset].as_mut())
            {
                *slot = *value;
            }
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
