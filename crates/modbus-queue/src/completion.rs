use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::BusError;

struct Slot<T> {
    outcome: Option<Result<T, BusError>>,
    waiters: Vec<Waker>,
}

/// Single-assignment result slot shared by every waiter of one command.
///
/// Clones refer to the same slot. The slot is resolved exactly once; all
/// current and future waiters observe that outcome.
pub struct Completion<M: RawMutex, T> {
    slot: Arc<Mutex<M, RefCell<Slot<T>>>>,
}

impl<M: RawMutex, T> Clone for Completion<M, T> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone() }
    }
}

impl<M: RawMutex, T> Completion<M, T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(RefCell::new(Slot {
                outcome: None,
                waiters: Vec::new(),
            }))),
        }
    }

    /// Store the outcome and wake every waiter.
    ///
    /// Returns `false` and leaves the slot untouched if it was already
    /// resolved.
    pub(crate) fn resolve(&self, outcome: Result<T, BusError>) -> bool {
        let waiters = self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.outcome.is_some() {
                return None;
            }
            slot.outcome = Some(outcome);
            Some(core::mem::take(&mut slot.waiters))
        });

        match waiters {
            Some(waiters) => {
                waiters.into_iter().for_each(Waker::wake);
                true
            }
            None => false,
        }
    }

    /// Whether the command behind this handle has finished.
    pub fn is_resolved(&self) -> bool {
        self.slot.lock(|slot| slot.borrow().outcome.is_some())
    }

    /// `true` if both handles belong to the same command.
    pub fn same_command(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<M: RawMutex, T: Clone> Completion<M, T> {
    /// Non-blocking peek at the outcome.
    pub fn try_get(&self) -> Option<Result<T, BusError>> {
        self.slot.lock(|slot| slot.borrow().outcome.clone())
    }

    /// Wait until the command is resolved.
    pub async fn wait(&self) -> Result<T, BusError> {
        poll_fn(|cx| {
            self.slot.lock(|slot| {
                let mut slot = slot.borrow_mut();
                if let Some(outcome) = &slot.outcome {
                    return Poll::Ready(outcome.clone());
                }
                if !slot.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                    slot.waiters.push(cx.waker().clone());
                }
                Poll::Pending
            })
        })
        .await
    }
}
