use alloc::vec::Vec;
use core::cmp::Ordering;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::completion::Completion;

/// Scheduling priority. Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(pub u8);

impl Priority {
    /// State changes requested by a device.
    pub const COMMAND: Priority = Priority(0);
    /// Routine status polling.
    pub const POLL: Priority = Priority(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    Read,
    Write,
}

pub(crate) enum Op<M: RawMutex> {
    Read { length: u16, done: Completion<M, Vec<u16>> },
    Write { values: Vec<u16>, done: Completion<M, ()> },
}

/// One pending bus transaction.
///
/// Ordered by `(priority, sequence)`; the sequence number is unique per
/// queue, so two commands never compare equal.
pub(crate) struct Command<M: RawMutex> {
    pub(crate) priority: Priority,
    pub(crate) sequence: u64,
    pub(crate) address: u16,
    pub(crate) op: Op<M>,
}

impl<M: RawMutex> Command<M> {
    pub(crate) fn kind(&self) -> CommandKind {
        match self.op {
            Op::Read { .. } => CommandKind::Read,
            Op::Write { .. } => CommandKind::Write,
        }
    }

    fn key(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }
}

impl<M: RawMutex> PartialEq for Command<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<M: RawMutex> Eq for Command<M> {}

impl<M: RawMutex> PartialOrd for Command<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M: RawMutex> Ord for Command<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
