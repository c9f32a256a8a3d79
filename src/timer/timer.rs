//! A single deadline timer and its lifecycle state machine.

use crate::clock::ClockDomain;
use crate::types::{Time, TimerId};
use core::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Work a timer performs when it fires.
///
/// Implemented for free by any `Fn() + Send + Sync` closure.
pub trait TimerAction: Send + Sync {
    /// Runs the action. Called at most once per arming, with no queue
    /// lock held.
    fn invoke(&self);
}

impl<F> TimerAction for F
where
    F: Fn() + Send + Sync,
{
    fn invoke(&self) {
        self();
    }
}

/// Lifecycle of a [`Timer`], stored as a single atomic tag.
///
/// ```text
/// Unscheduled -> Queued -> Executing -> Completed
///                  |           |
///                  v           v
///              Cancelled   Cancelled
/// ```
///
/// `Queued -> Cancelled` unlinks the timer before it fires. The two
/// transitions out of `Executing` are a racing CAS pair: the sweep
/// commits the run with `Executing -> Completed`, a cancel defuses it
/// with `Executing -> Cancelled`, and exactly one wins. Both tags are
/// terminal for the arming; a settled timer may be re-armed, receiving
/// a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    /// Not attached to any queue.
    Unscheduled = 0,
    /// Linked into a queue, waiting for its deadline.
    Queued = 1,
    /// Popped by a firing sweep; the commit/defuse race is still open.
    Executing = 2,
    /// The sweep committed the run; cancellation can no longer stop
    /// the action.
    Completed = 3,
    /// Cancelled before the action ran.
    Cancelled = 4,
}

impl TimerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Unscheduled,
            1 => Self::Queued,
            2 => Self::Executing,
            3 => Self::Completed,
            4 => Self::Cancelled,
            _ => unreachable!("timer state tag {raw} out of range"),
        }
    }
}

/// A one-shot timer: a deadline in a clock domain plus an action.
///
/// The state tag lives in one atomic, so cancellation can race the
/// firing sweep without locks and exactly one side wins. Timers are
/// shared behind [`Arc`](std::sync::Arc) between the caller and the
/// queue; dropping the caller's handle never cancels the timer.
pub struct Timer {
    /// Assigned by the queue on add; zero while unscheduled.
    id: AtomicU64,
    domain: ClockDomain,
    deadline: Time,
    state: AtomicU8,
    action: Box<dyn TimerAction>,
}

impl Timer {
    /// Creates an unscheduled timer.
    #[must_use]
    pub fn new<A>(domain: ClockDomain, deadline: Time, action: A) -> Self
    where
        A: TimerAction + 'static,
    {
        Self {
            id: AtomicU64::new(0),
            domain,
            deadline,
            state: AtomicU8::new(TimerState::Unscheduled as u8),
            action: Box::new(action),
        }
    }

    /// Clock domain this timer's deadline is measured in.
    #[must_use]
    pub const fn domain(&self) -> ClockDomain {
        self.domain
    }

    /// Instant at which the timer becomes due.
    #[must_use]
    pub const fn deadline(&self) -> Time {
        self.deadline
    }

    /// Queue-assigned id, or `None` if the timer was never added.
    #[must_use]
    pub fn id(&self) -> Option<TimerId> {
        match self.id.load(Ordering::Acquire) {
            0 => None,
            raw => Some(TimerId::from_raw(raw)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        TimerState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Returns true if the timer settled as cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == TimerState::Cancelled
    }

    pub(crate) fn assign_id(&self, id: TimerId) {
        self.id.store(id.as_u64(), Ordering::Release);
    }

    /// Transitions into `Queued`. Panics if the timer is still live on
    /// a queue; re-arming a settled timer is allowed.
    pub(crate) fn mark_queued(&self) {
        let raw = self.state.swap(TimerState::Queued as u8, Ordering::AcqRel);
        let previous = TimerState::from_raw(raw);
        assert!(
            !matches!(previous, TimerState::Queued | TimerState::Executing),
            "timer re-added to a queue while still live ({previous:?})"
        );
    }

    /// Claims the timer for execution. Caller holds the queue lock, so
    /// no other transition out of `Queued` can race this.
    pub(crate) fn begin_executing(&self) {
        let claimed = self
            .state
            .compare_exchange(
                TimerState::Queued as u8,
                TimerState::Executing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        debug_assert!(claimed, "fired timer was not queued");
    }

    /// Settles an unlinked timer as cancelled. Caller holds the queue
    /// lock and has just removed it from the pending list.
    pub(crate) fn mark_cancelled(&self) {
        let unlinked = self
            .state
            .compare_exchange(
                TimerState::Queued as u8,
                TimerState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        debug_assert!(unlinked, "unlinked timer was not queued");
    }

    /// Tries to cancel a claimed timer before its action starts.
    ///
    /// Returns true if the action was defused and will not run. Lock
    /// free: this races the firing sweep's commit, and exactly one of
    /// the two CASes wins.
    pub(crate) fn defuse(&self) -> bool {
        self.state
            .compare_exchange(
                TimerState::Executing as u8,
                TimerState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Commits the claimed timer's action to run, settling it as
    /// `Completed`. Returns false if a defuse won first, in which case
    /// the action must be skipped.
    pub(crate) fn commit_run(&self) -> bool {
        self.state
            .compare_exchange(
                TimerState::Executing as u8,
                TimerState::Completed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn run_action(&self) {
        self.action.invoke();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id())
            .field("domain", &self.domain)
            .field("deadline", &self.deadline)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
