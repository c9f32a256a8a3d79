//! Condition-based blocking with wake latching.
//!
//! [`WaitQueue`] suspends threads until a wake operation releases them. A
//! wake that finds no eligible waiter is latched rather than dropped: the
//! next block call consumes the latch and returns without suspending.
//! That closes the window where a wake lands between a thread's decision
//! to block and the block itself.
//!
//! Waiters are released oldest first. A waiter may carry a
//! [`WakeCondition`] that wake operations consult; ineligible waiters are
//! skipped and keep their place in line.
//!
//! # Example
//!
//! ```
//! use snooze::WaitQueue;
//!
//! let queue = WaitQueue::new();
//!
//! // A wake with nobody around is latched, not dropped.
//! assert_eq!(queue.wake_one(), 0);
//! assert!(queue.is_wake_latched());
//!
//! // The latch satisfies the next block without suspending.
//! assert!(!queue.block().did_block());
//! assert!(!queue.is_wake_latched());
//! ```

use super::blocker::{BlockResult, Blocker, WakeCondition};
use crate::clock::ClockDomain;
use crate::sched::{Scheduler, ThreadScheduler};
use crate::timer::TimerQueue;
use crate::types::Time;
use core::fmt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// Waiter bookkeeping behind the queue lock.
#[derive(Debug)]
struct WaitState {
    /// Waiting blockers, oldest at the front.
    waiters: VecDeque<Arc<Blocker>>,
    /// A wake credit that found no eligible waiter.
    wake_latched: bool,
}

/// A queue of threads waiting to be woken.
///
/// Shared by construction: the constructors hand back the queue already
/// behind an [`Arc`], and there is no global instance. The scheduler
/// that suspends and resumes threads is injected at construction,
/// defaulting to [`ThreadScheduler`].
///
/// Wake operations are cheap and never block: they scan the waiter list
/// under a short lock and notify released threads after dropping it.
pub struct WaitQueue {
    state: Mutex<WaitState>,
    scheduler: Arc<dyn Scheduler>,
    /// Captured by timeout timers so they can find their way back.
    weak_self: Weak<WaitQueue>,
}

impl WaitQueue {
    /// Creates a wait queue backed by the default thread scheduler.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_scheduler(Arc::new(ThreadScheduler::new()))
    }

    /// Creates a wait queue with an injected scheduler.
    #[must_use]
    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(WaitState {
                waiters: VecDeque::new(),
                wake_latched: false,
            }),
            scheduler,
            weak_self: weak.clone(),
        })
    }

    // =========================================================================
    // Blocking
    // =========================================================================

    /// Blocks the calling thread until a wake operation releases it.
    ///
    /// If a wake is latched, consumes the latch and returns
    /// [`BlockResult::NotBlocked`] without suspending.
    pub fn block(&self) -> BlockResult {
        self.block_inner(None, None)
    }

    /// Blocks with a wake condition that wake operations consult.
    ///
    /// A latched wake is still consumed first, even if `condition` does
    /// not hold: the latch means a wake credit went unclaimed, and the
    /// caller should re-evaluate its world before waiting again.
    pub fn block_when<C>(&self, condition: C) -> BlockResult
    where
        C: WakeCondition + 'static,
    {
        self.block_inner(Some(Box::new(condition)), None)
    }

    /// Blocks until woken or until `deadline` in `domain` passes.
    ///
    /// The deadline is tracked by a timer on `timers`; something must
    /// drive [`TimerQueue::fire`] for the timeout to be delivered. On a
    /// normal wake the timer is cancelled.
    pub fn block_until(
        &self,
        timers: &TimerQueue,
        domain: ClockDomain,
        deadline: Time,
    ) -> BlockResult {
        self.block_inner(None, Some((timers, domain, deadline)))
    }

    /// Blocks until woken or until `timeout` elapses on the monotonic clock.
    pub fn block_for(&self, timers: &TimerQueue, timeout: Duration) -> BlockResult {
        let deadline = timers.clock().now(ClockDomain::Monotonic) + timeout;
        self.block_until(timers, ClockDomain::Monotonic, deadline)
    }

    /// Blocks with both a wake condition and a deadline.
    ///
    /// The classic combined form: return when a wake claims the waiter
    /// or the deadline passes, whichever comes first.
    pub fn block_when_until<C>(
        &self,
        timers: &TimerQueue,
        domain: ClockDomain,
        deadline: Time,
        condition: C,
    ) -> BlockResult
    where
        C: WakeCondition + 'static,
    {
        self.block_inner(Some(Box::new(condition)), Some((timers, domain, deadline)))
    }

    fn block_inner(
        &self,
        condition: Option<Box<dyn WakeCondition>>,
        timeout: Option<(&TimerQueue, ClockDomain, Time)>,
    ) -> BlockResult {
        let blocker = {
            let mut state = self.lock_state();
            if state.wake_latched {
                state.wake_latched = false;
                tracing::trace!("consumed latched wake without suspending");
                return BlockResult::NotBlocked;
            }
            let blocker = Arc::new(Blocker::new(condition));
            state.waiters.push_back(Arc::clone(&blocker));
            blocker
        };

        // Registered; a wake from here on finds us. The timeout timer is
        // armed only after registration so it can never fire first and
        // miss the waiter list entry. It holds only weak references: a
        // dead upgrade means the waiter was already released and dropped.
        let timer = timeout.map(|(timers, domain, deadline)| {
            let owner = self.weak_self.clone();
            let target = Arc::downgrade(&blocker);
            timers.schedule(domain, deadline, move || {
                if let (Some(queue), Some(blocker)) = (owner.upgrade(), target.upgrade()) {
                    queue.release_timed_out(&blocker);
                }
            })
        });

        self.scheduler.suspend(&blocker);

        let result = blocker
            .unblock_result()
            .expect("scheduler returned from suspend with blocker still waiting");

        if result == BlockResult::Woken {
            if let (Some(timer), Some((timers, _, _))) = (timer, timeout) {
                // WasExecuting here means the timeout action lost the race
                // and will observe the settled blocker, doing nothing.
                let _ = timers.cancel_timer(&timer);
            }
        }
        result
    }

    // =========================================================================
    // Waking
    // =========================================================================

    /// Wakes the first waiter whose condition holds.
    ///
    /// Returns the number of waiters released (0 or 1). A wake that
    /// releases nobody is latched for the next block call.
    pub fn wake_one(&self) -> usize {
        self.wake_some(1)
    }

    /// Wakes up to `credits` eligible waiters, oldest first.
    ///
    /// `wake_n(0)` is a true no-op: it releases nobody and leaves the
    /// latch untouched.
    pub fn wake_n(&self, credits: usize) -> usize {
        if credits == 0 {
            return 0;
        }
        self.wake_some(credits)
    }

    /// Wakes every waiter whose condition holds.
    pub fn wake_all(&self) -> usize {
        self.wake_some(usize::MAX)
    }

    fn wake_some(&self, credits: usize) -> usize {
        let released = {
            let mut state = self.lock_state();
            let mut released = Vec::new();
            let mut index = 0;
            while index < state.waiters.len() && released.len() < credits {
                if state.waiters[index].condition_holds() {
                    let blocker = state
                        .waiters
                        .remove(index)
                        .expect("waiter index in bounds");
                    let was_waiting = blocker.unblock(BlockResult::Woken);
                    debug_assert!(was_waiting, "queued blocker already unblocked");
                    released.push(blocker);
                } else {
                    index += 1;
                }
            }
            // Releasing nobody latches the wake; releasing anybody clears
            // any previous latch.
            state.wake_latched = released.is_empty();
            released
        };

        // Notify outside the lock.
        for blocker in &released {
            self.scheduler.resume(blocker);
        }
        released.len()
    }

    /// Timeout path: releases `blocker` if it is still queued here.
    ///
    /// Runs on the timer-firing thread. If a wake already claimed the
    /// blocker it is gone from the waiter list and this does nothing.
    pub(crate) fn release_timed_out(&self, blocker: &Arc<Blocker>) {
        let released = {
            let mut state = self.lock_state();
            match state
                .waiters
                .iter()
                .position(|waiter| Arc::ptr_eq(waiter, blocker))
            {
                Some(index) => {
                    state.waiters.remove(index);
                    let was_waiting = blocker.unblock(BlockResult::TimedOut);
                    debug_assert!(was_waiting, "queued blocker already unblocked");
                    true
                }
                None => false,
            }
        };
        if released {
            self.scheduler.resume(blocker);
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of threads currently waiting.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Returns true if an unclaimed wake credit is latched.
    #[must_use]
    pub fn is_wake_latched(&self) -> bool {
        self.lock_state().wake_latched
    }

    fn lock_state(&self) -> MutexGuard<'_, WaitState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("WaitQueue")
            .field("waiters", &state.waiters.len())
            .field("wake_latched", &state.wake_latched)
            .finish_non_exhaustive()
    }
}

impl Drop for WaitQueue {
    fn drop(&mut self) {
        // Blocked threads hold strong references through their release
        // path, so reaching here with waiters attached means the
        // bookkeeping is corrupt.
        if let Ok(state) = self.state.get_mut() {
            assert!(
                state.waiters.is_empty(),
                "wait queue dropped with {} waiters attached",
                state.waiters.len()
            );
        }
    }
}
