//! Deadline-ordered timer queues, partitioned by clock domain.
//!
//! [`TimerQueue`] keeps one pending list per [`ClockDomain`], ordered by
//! deadline with ties broken by insertion order. The earliest pending
//! deadline per domain is cached so pollers can check for due work
//! without walking the lists.
//!
//! Firing never holds the queue lock across a timer action, so actions
//! are free to schedule and cancel timers on the same queue. While an
//! action runs its timer sits on a separate executing list, which is
//! what lets [`TimerQueue::cancel_timer`] distinguish "unlinked in
//! time" from "already in flight".
//!
//! # Example
//!
//! ```
//! use snooze::{ClockDomain, Time, TimerQueue, VirtualClock};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(VirtualClock::new());
//! let timers = TimerQueue::new(clock.clone());
//!
//! timers.schedule(ClockDomain::Monotonic, Time::from_millis(50), || {
//!     println!("due");
//! });
//!
//! clock.advance(ClockDomain::Monotonic, std::time::Duration::from_millis(60));
//! assert_eq!(timers.fire(), 1);
//! ```

use super::timer::{Timer, TimerAction};
use crate::clock::{ClockDomain, ClockSource};
use crate::types::{Time, TimerId};
use core::fmt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Outcome of [`TimerQueue::cancel_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStatus {
    /// The timer was unlinked while still pending; its action will not
    /// run.
    Removed,
    /// A firing sweep had already claimed the timer. The action was
    /// defused if the sweep had not yet committed it;
    /// [`Timer::is_cancelled`] says which way the race went.
    WasExecuting,
    /// The timer had already settled, or was never added here.
    AlreadySettled,
}

impl CancelStatus {
    /// True if the timer was unlinked before its action could run.
    #[must_use]
    pub const fn removed(self) -> bool {
        matches!(self, Self::Removed)
    }

    /// True if a firing sweep was working on the timer at cancel time.
    #[must_use]
    pub const fn was_in_use(self) -> bool {
        matches!(self, Self::WasExecuting)
    }
}

/// One clock domain's share of the queue.
#[derive(Debug)]
struct DomainQueue {
    /// Pending timers, ordered by deadline then insertion.
    queued: VecDeque<Arc<Timer>>,
    /// Deadline at the front of `queued`, cached for cheap polling.
    next_due: Option<Time>,
    /// Timers claimed by a firing sweep and not yet settled.
    executing: Vec<Arc<Timer>>,
}

impl DomainQueue {
    const fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            next_due: None,
            executing: Vec::new(),
        }
    }

    /// Inserts in deadline order. Equal deadlines keep insertion order,
    /// so the scan places the new timer after every peer that is due no
    /// later than it.
    fn insert(&mut self, timer: Arc<Timer>) {
        let deadline = timer.deadline();
        let index = self
            .queued
            .partition_point(|queued| queued.deadline() <= deadline);
        self.queued.insert(index, timer);
        if index == 0 {
            self.next_due = Some(deadline);
        }
    }

    fn refresh_next_due(&mut self) {
        self.next_due = self.queued.front().map(|timer| timer.deadline());
    }
}

#[derive(Debug)]
struct Domains {
    monotonic: DomainQueue,
    realtime: DomainQueue,
}

impl Domains {
    const fn new() -> Self {
        Self {
            monotonic: DomainQueue::new(),
            realtime: DomainQueue::new(),
        }
    }

    const fn get(&self, domain: ClockDomain) -> &DomainQueue {
        match domain {
            ClockDomain::Monotonic => &self.monotonic,
            ClockDomain::Realtime => &self.realtime,
        }
    }

    fn get_mut(&mut self, domain: ClockDomain) -> &mut DomainQueue {
        match domain {
            ClockDomain::Monotonic => &mut self.monotonic,
            ClockDomain::Realtime => &mut self.realtime,
        }
    }
}

/// A queue of one-shot timers keyed by deadline.
///
/// Constructed with an injected [`ClockSource`]; there is no global
/// queue. Something must call [`fire`](Self::fire) for due timers to
/// run, typically a [`TickDriver`](super::TickDriver) or a test driving
/// a [`VirtualClock`](crate::clock::VirtualClock) by hand.
pub struct TimerQueue {
    clock: Arc<dyn ClockSource>,
    domains: Mutex<Domains>,
    /// Next id to hand out. Starts at 1; zero marks an unassigned timer.
    next_id: AtomicU64,
}

impl TimerQueue {
    /// Creates an empty queue reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            clock,
            domains: Mutex::new(Domains::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The clock source this queue measures deadlines against.
    #[must_use]
    pub fn clock(&self) -> &dyn ClockSource {
        self.clock.as_ref()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Adds an armed timer to the queue and returns its assigned id.
    ///
    /// A timer whose deadline has already passed is accepted and fires
    /// on the next sweep.
    ///
    /// # Panics
    ///
    /// Panics if `timer` is already live on a queue. A settled timer may
    /// be re-armed and receives a fresh id.
    pub fn add_timer(&self, timer: Arc<Timer>) -> TimerId {
        // Refuse a double-add before touching the id, so a live timer
        // keeps the id its queue knows it by.
        timer.mark_queued();
        let id = TimerId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        timer.assign_id(id);
        let domain = timer.domain();
        let deadline_ns = timer.deadline().as_nanos();
        {
            let mut domains = self.lock_domains();
            domains.get_mut(domain).insert(timer);
        }
        tracing::trace!(id = id.as_u64(), ?domain, deadline_ns, "timer added");
        id
    }

    /// Creates and adds a timer firing `action` at `deadline`.
    pub fn schedule<A>(&self, domain: ClockDomain, deadline: Time, action: A) -> Arc<Timer>
    where
        A: TimerAction + 'static,
    {
        let timer = Arc::new(Timer::new(domain, deadline, action));
        self.add_timer(Arc::clone(&timer));
        timer
    }

    /// Creates and adds a timer firing `action` after `delay` on
    /// `domain`'s clock.
    pub fn schedule_after<A>(&self, domain: ClockDomain, delay: Duration, action: A) -> Arc<Timer>
    where
        A: TimerAction + 'static,
    {
        let deadline = self.clock.now(domain) + delay;
        self.schedule(domain, deadline, action)
    }

    /// Cancels a timer, unlinking it if it is still pending.
    ///
    /// If a firing sweep already claimed the timer, this defuses the
    /// action when the sweep has not committed it yet and reports
    /// [`CancelStatus::WasExecuting`] either way.
    #[must_use = "the status says whether the action was stopped"]
    pub fn cancel_timer(&self, timer: &Arc<Timer>) -> CancelStatus {
        let status = {
            let mut domains = self.lock_domains();
            let queue = domains.get_mut(timer.domain());
            if let Some(index) = queue
                .queued
                .iter()
                .position(|queued| Arc::ptr_eq(queued, timer))
            {
                let removed = queue.queued.remove(index).expect("timer index in bounds");
                removed.mark_cancelled();
                if index == 0 {
                    queue.refresh_next_due();
                }
                CancelStatus::Removed
            } else if queue
                .executing
                .iter()
                .any(|executing| Arc::ptr_eq(executing, timer))
            {
                // The sweep owns the timer now; defusing the action is
                // the only lever left, and losing that race means the
                // action is running or already ran.
                let _ = timer.defuse();
                CancelStatus::WasExecuting
            } else {
                CancelStatus::AlreadySettled
            }
        };
        tracing::trace!(id = ?timer.id(), ?status, "timer cancelled");
        status
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Runs every due timer's action and returns how many ran.
    ///
    /// Timers run one at a time, oldest deadline first within each
    /// domain, with the queue lock released around each action. Due
    /// follow-ups scheduled by an action run in the same sweep.
    pub fn fire(&self) -> usize {
        let mut fired = 0;
        for domain in ClockDomain::ALL {
            fired += self.fire_domain(domain);
        }
        fired
    }

    fn fire_domain(&self, domain: ClockDomain) -> usize {
        let mut fired = 0;
        loop {
            // Re-read per iteration: actions may move a virtual clock.
            let now = self.clock.now(domain);
            let timer = {
                let mut domains = self.lock_domains();
                let queue = domains.get_mut(domain);
                if !queue.next_due.is_some_and(|due| due <= now) {
                    break;
                }
                let timer = queue
                    .queued
                    .pop_front()
                    .expect("cached next_due with no pending timer");
                debug_assert!(timer.deadline() <= now, "popped timer not yet due");
                timer.begin_executing();
                queue.executing.push(Arc::clone(&timer));
                queue.refresh_next_due();
                timer
            };

            // Lock released. A cancel can defuse the action right up to
            // this commit; past it, the action runs to completion.
            let ran = timer.commit_run();
            if ran {
                timer.run_action();
            }

            let mut domains = self.lock_domains();
            let queue = domains.get_mut(domain);
            let index = queue
                .executing
                .iter()
                .position(|executing| Arc::ptr_eq(executing, &timer))
                .expect("settling timer missing from the executing list");
            queue.executing.swap_remove(index);
            if ran {
                fired += 1;
            }
        }
        if fired > 0 {
            tracing::trace!(?domain, fired, "timer sweep");
        }
        fired
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Earliest pending deadline in `domain`, if any.
    ///
    /// Reads the cached value; cost is one lock acquisition.
    #[must_use]
    pub fn next_due(&self, domain: ClockDomain) -> Option<Time> {
        self.lock_domains().get(domain).next_due
    }

    /// Number of pending timers across both domains.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let domains = self.lock_domains();
        domains.monotonic.queued.len() + domains.realtime.queued.len()
    }

    /// Number of timers currently claimed by a firing sweep.
    #[must_use]
    pub fn executing_count(&self) -> usize {
        let domains = self.lock_domains();
        domains.monotonic.executing.len() + domains.realtime.executing.len()
    }

    fn lock_domains(&self) -> MutexGuard<'_, Domains> {
        match self.domains.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domains = self.lock_domains();
        f.debug_struct("TimerQueue")
            .field("monotonic_pending", &domains.monotonic.queued.len())
            .field("realtime_pending", &domains.realtime.queued.len())
            .field(
                "executing",
                &(domains.monotonic.executing.len() + domains.realtime.executing.len()),
            )
            .finish_non_exhaustive()
    }
}
