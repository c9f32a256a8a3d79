//! Snooze: condition-based thread blocking and deadline timers with race-free wake latching.
//!
//! # Overview
//!
//! Snooze pairs the two primitives that make up the sleep/wake half of a
//! scheduler. A [`WaitQueue`] suspends threads until a wake operation
//! releases them, latching any wake that finds nobody eligible so the
//! credit satisfies the next block call instead of vanishing. A
//! [`TimerQueue`] runs one-shot actions at deadlines measured against an
//! injected clock source, partitioned by clock domain, with cancellation
//! that stays well-defined even while an action is in flight.
//!
//! Everything is constructed explicitly and shared behind `Arc`; there
//! are no global queues and no ambient clock.
//!
//! # Core Guarantees
//!
//! - **No lost wakeups**: a wake with no eligible waiter is latched and satisfies the next block
//! - **Credit-bounded waking**: `wake_n(k)` releases at most `k` waiters, each exactly once
//! - **FIFO fairness**: waiters and equal-deadline timers release in arrival order
//! - **Deadline order**: timers fire earliest-first within their clock domain, never early
//! - **Unlocked callbacks**: timer actions run without the queue lock and may schedule or cancel
//! - **Race-safe cancellation**: cancelling a firing timer reports the race instead of hiding it
//!
//! # Module Structure
//!
//! - [`types`]: Core types (timestamps, timer identifiers)
//! - [`clock`]: Clock domains and pluggable clock sources
//! - [`sched`]: The seam between wait queues and thread suspension
//! - [`wait`]: Wait queues, blockers, and wake conditions
//! - [`timer`]: One-shot timers, timer queues, and the tick driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod clock;
pub mod sched;
pub mod timer;
pub mod types;
pub mod wait;

#[cfg(test)]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use clock::{ClockDomain, ClockSource, SystemClock, VirtualClock};
pub use sched::{Scheduler, ThreadScheduler};
pub use timer::{
    CancelStatus, DriverConfig, DriverError, TickDriver, Timer, TimerAction, TimerQueue,
    TimerState,
};
pub use types::{Time, TimerId};
pub use wait::{BlockResult, Blocker, WaitQueue, WakeCondition};
