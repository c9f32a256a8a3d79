//! Thread blocking and waking.
//!
//! Building blocks:
//! - [`WaitQueue`]: condition-based blocking with wake latching
//! - [`Blocker`]: one thread's single-use wait registration
//! - [`WakeCondition`]: eligibility predicate consulted by wake operations
//! - [`BlockResult`]: how a block call came back

mod blocker;
mod queue;

pub use blocker::{BlockResult, Blocker, WakeCondition};
pub use queue::WaitQueue;
