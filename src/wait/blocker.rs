//! A single suspension of a single thread.
//!
//! A [`Blocker`] is created by the wait queue for each block call. It is a
//! one-shot state machine (`Waiting` until released, then `Unblocked`,
//! terminal) with a built-in parker the default scheduler uses to suspend
//! and resume the thread.

use core::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Why a block call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockResult {
    /// A latched wake was consumed; the thread never suspended.
    NotBlocked,
    /// A wake operation released the blocker.
    Woken,
    /// The timeout timer fired before any wake matched.
    TimedOut,
}

impl BlockResult {
    /// Returns true if the thread actually suspended.
    #[must_use]
    pub const fn did_block(self) -> bool {
        !matches!(self, Self::NotBlocked)
    }
}

/// Condition a waiter is waiting for, consulted by wake operations.
///
/// Conditions run under the queue lock: keep them cheap, and never call
/// back into the queue from one.
pub trait WakeCondition: Send + Sync {
    /// Returns true if the waiter is eligible to be woken.
    fn holds(&self) -> bool;
}

impl<F> WakeCondition for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn holds(&self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Unblocked(BlockResult),
}

/// One suspension of one thread on one [`WaitQueue`](super::WaitQueue).
///
/// While `Waiting`, the blocker sits in exactly one queue's waiter list.
/// A wake operation or a timeout releases it exactly once; `Unblocked` is
/// terminal and the blocker is never re-enqueued.
pub struct Blocker {
    condition: Option<Box<dyn WakeCondition>>,
    state: Mutex<State>,
    unparked: Condvar,
}

impl Blocker {
    pub(crate) fn new(condition: Option<Box<dyn WakeCondition>>) -> Self {
        Self {
            condition,
            state: Mutex::new(State::Waiting),
            unparked: Condvar::new(),
        }
    }

    /// Returns true once a wake or timeout has released this blocker.
    #[must_use]
    pub fn is_unblocked(&self) -> bool {
        !matches!(*self.lock_state(), State::Waiting)
    }

    /// Parks the calling thread until the blocker is unblocked.
    ///
    /// Returns immediately if it already is, so a release that lands
    /// between registration and parking is never lost. This is the
    /// suspension primitive behind the default scheduler; custom
    /// schedulers may delegate here.
    pub fn park(&self) {
        let mut state = self.lock_state();
        while matches!(*state, State::Waiting) {
            state = match self.unparked.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Wakes a thread parked in [`park`](Self::park).
    ///
    /// Only meaningful after the blocker has been unblocked; `park` loops
    /// on the state, so stray notifications are harmless.
    pub fn unpark(&self) {
        self.unparked.notify_one();
    }

    /// Releases the blocker. Returns false if it was already released.
    ///
    /// Callers hold the owning queue's lock, which serializes a wake
    /// against a timeout racing for the same blocker.
    pub(crate) fn unblock(&self, result: BlockResult) -> bool {
        debug_assert!(result.did_block(), "cannot unblock with NotBlocked");
        let mut state = self.lock_state();
        if matches!(*state, State::Waiting) {
            *state = State::Unblocked(result);
            true
        } else {
            false
        }
    }

    /// The release reason, once unblocked.
    pub(crate) fn unblock_result(&self) -> Option<BlockResult> {
        match *self.lock_state() {
            State::Waiting => None,
            State::Unblocked(result) => Some(result),
        }
    }

    /// Evaluates the wake condition; unconditional waiters always hold.
    pub(crate) fn condition_holds(&self) -> bool {
        self.condition.as_ref().map_or(true, |cond| cond.holds())
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker")
            .field("state", &*self.lock_state())
            .field("conditional", &self.condition.is_some())
            .finish_non_exhaustive()
    }
}
