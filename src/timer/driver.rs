//! Background thread that sweeps a timer queue.

use super::queue::TimerQueue;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for a [`TickDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// How often the driver sweeps for due timers.
    pub period: Duration,
}

impl DriverConfig {
    /// Creates the default configuration: one sweep per millisecond.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            period: Duration::from_millis(1),
        }
    }

    /// Sets the sweep period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure to start the tick thread.
#[derive(Debug, thiserror::Error)]
#[error("failed to spawn timer tick thread")]
pub struct DriverError(#[from] io::Error);

/// Drives a [`TimerQueue`] from a dedicated thread.
///
/// The thread runs [`TimerQueue::fire`] once per configured period.
/// Dropping the driver stops the thread and joins it; timers already
/// queued simply stop being swept.
///
/// # Example
///
/// ```no_run
/// use snooze::{ClockDomain, DriverConfig, SystemClock, TickDriver, TimerQueue};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let timers = Arc::new(TimerQueue::new(Arc::new(SystemClock::new())));
/// let driver = TickDriver::spawn(Arc::clone(&timers), DriverConfig::new())
///     .expect("spawn tick driver");
///
/// timers.schedule_after(ClockDomain::Monotonic, Duration::from_millis(5), || {
///     println!("due");
/// });
/// # driver.shutdown();
/// ```
#[derive(Debug)]
pub struct TickDriver {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TickDriver {
    /// Starts the tick thread.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] if the OS refuses to spawn the thread.
    pub fn spawn(timers: Arc<TimerQueue>, config: DriverConfig) -> Result<Self, DriverError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let period = config.period;
        let period_us = period.as_micros() as u64;
        let thread = thread::Builder::new()
            .name("snooze-tick".into())
            .spawn(move || {
                tracing::debug!(period_us, "tick driver started");
                while !flag.load(Ordering::Acquire) {
                    let fired = timers.fire();
                    if fired > 0 {
                        tracing::trace!(fired, "tick sweep");
                    }
                    // Shutdown unparks us, so a long period does not
                    // delay the join.
                    thread::park_timeout(period);
                }
                tracing::debug!("tick driver stopped");
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stops the tick thread and joins it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                tracing::error!("tick driver thread panicked");
            }
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
