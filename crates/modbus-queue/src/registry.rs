use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::BusError;
use crate::queue::{BusConfig, BusQueue};

/// Longest accepted bus identifier, in bytes.
pub const MAX_BUS_ID_LEN: usize = 32;

/// Name of a physical bus, usually the name of the Modbus hub serving it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId(heapless::String<MAX_BUS_ID_LEN>);

impl BusId {
    pub fn new(id: &str) -> Result<Self, BusError> {
        if id.is_empty() {
            return Err(BusError::InvalidBusId);
        }
        let mut inner = heapless::String::new();
        inner.push_str(id).map_err(|_| BusError::InvalidBusId)?;
        Ok(Self(inner))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl core::fmt::Display for BusId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`BusRegistry::get_or_create`].
pub enum BusSlot<M: RawMutex> {
    /// First request for this bus. The caller owns starting its worker with
    /// [`BusQueue::run`].
    Created(Arc<BusQueue<M>>),
    /// The bus already existed; its worker is someone else's concern.
    Existing(Arc<BusQueue<M>>),
}

impl<M: RawMutex> BusSlot<M> {
    pub fn is_created(&self) -> bool {
        matches!(self, BusSlot::Created(_))
    }

    pub fn queue(&self) -> &Arc<BusQueue<M>> {
        match self {
            BusSlot::Created(queue) | BusSlot::Existing(queue) => queue,
        }
    }

    pub fn into_queue(self) -> Arc<BusQueue<M>> {
        match self {
            BusSlot::Created(queue) | BusSlot::Existing(queue) => queue,
        }
    }
}

/// One command queue per bus identifier.
///
/// Built once at startup and shared by every component that wires devices
/// to buses. Queues are created lazily on first request and live as long as
/// the registry.
pub struct BusRegistry<M: RawMutex> {
    buses: Mutex<M, RefCell<BTreeMap<BusId, Arc<BusQueue<M>>>>>,
}

impl<M: RawMutex> Default for BusRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> BusRegistry<M> {
    pub const fn new() -> Self {
        Self { buses: Mutex::new(RefCell::new(BTreeMap::new())) }
    }

    /// Return the queue for `id`, creating it with `config` if needed.
    ///
    /// The first creator wins: `config` is ignored for an existing bus.
    pub fn get_or_create(
        &self,
        id: &str,
        config: BusConfig,
    ) -> Result<BusSlot<M>, BusError> {
        let id = BusId::new(id)?;
        Ok(self.buses.lock(|buses| {
            let mut buses = buses.borrow_mut();
            if let Some(queue) = buses.get(&id) {
                if queue.config() != &config {
                    debug!(
                        "bus {}: keeping existing configuration",
                        id.as_str()
                    );
                }
                return BusSlot::Existing(queue.clone());
            }

            info!("bus {}: created", id.as_str());
            let queue = Arc::new(BusQueue::new(id.clone(), config));
            buses.insert(id, queue.clone());
            BusSlot::Created(queue)
        }))
    }

    pub fn get(&self, id: &str) -> Option<Arc<BusQueue<M>>> {
        let id = BusId::new(id).ok()?;
        self.buses.lock(|buses| buses.borrow().get(&id).cloned())
    }

    pub fn ids(&self) -> Vec<BusId> {
        self.buses.lock(|buses| buses.borrow().keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.buses.lock(|buses| buses.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
