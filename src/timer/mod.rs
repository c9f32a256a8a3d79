//! One-shot deadline timers.
//!
//! Building blocks:
//! - [`Timer`]: a deadline plus an action, with an atomic lifecycle tag
//! - [`TimerQueue`]: deadline-ordered queues partitioned by clock domain
//! - [`TickDriver`]: a thread that sweeps a queue on a fixed period

mod driver;
mod queue;
mod timer;

pub use driver::{DriverConfig, DriverError, TickDriver};
pub use queue::{CancelStatus, TimerQueue};
pub use timer::{Timer, TimerAction, TimerState};
