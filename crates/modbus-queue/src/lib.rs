#![no_std]
//! Serialized register access for a shared Modbus bus.
//!
//! Many devices poll and command registers behind one gateway, but the
//! gateway carries a single request/response transaction at a time. A
//! [`BusQueue`] per bus turns concurrent register operations into one
//! ordered stream of transactions:
//!
//! - writes ([`Priority::COMMAND`]) run ahead of polling reads
//!   ([`Priority::POLL`]), FIFO within a priority,
//! - identical reads in flight share one transaction and one result,
//! - a failed transaction fails only its own waiters.
//!
//! Devices talk to the queue through [`Registers`], which adds an optional
//! block cache and schedules a bus-wide "registers updated" broadcast after
//! every successful write.
extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod cache;
mod command;
mod completion;
mod error;
mod facade;
mod queue;
mod registry;
mod transport;

pub use cache::{BlockCache, BLOCK_SIZE};
pub use command::{CommandKind, Priority};
pub use completion::Completion;
pub use error::{BusError, TransportError};
pub use facade::{
    FacadeConfig, Registers, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS,
};
pub use queue::{BusConfig, BusQueue, UpdateListener};
pub use registry::{BusId, BusRegistry, BusSlot, MAX_BUS_ID_LEN};
pub use transport::Transport;
