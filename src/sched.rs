//! The seam between the wait queue and thread suspension.
//!
//! The wait queue never suspends a thread directly; it hands the
//! [`Blocker`](crate::wait::Blocker) to a [`Scheduler`]. The default
//! [`ThreadScheduler`] maps the handshake onto the blocker's built-in
//! parker. Alternative implementations can instrument the handshake or
//! integrate with a different execution environment.

use crate::wait::Blocker;

/// Suspends and resumes blocked threads.
///
/// # Contract
///
/// - `suspend` returns only once the blocker is unblocked. If it already
///   is on entry, `suspend` returns immediately; a resume landing between
///   queue registration and suspension must not be lost.
/// - `resume` marks the suspended thread runnable. It must never block,
///   and must be safe to call while the blocking thread is still on its
///   way into `suspend`.
/// - The wait queue serializes the release decision under its lock, so a
///   blocker sees at most one `resume` in its lifetime.
pub trait Scheduler: Send + Sync {
    /// Parks the calling thread until `blocker` is unblocked.
    fn suspend(&self, blocker: &Blocker);

    /// Marks the thread suspended on `blocker` runnable.
    fn resume(&self, blocker: &Blocker);
}

/// Default scheduler backed by each blocker's own parker.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    /// Creates the default scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn suspend(&self, blocker: &Blocker) {
        blocker.park();
    }

    fn resume(&self, blocker: &Blocker) {
        blocker.unpark();
    }
}
