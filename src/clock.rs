//! Clock domains and time sources.
//!
//! Every timer deadline is interpreted in one of two [`ClockDomain`]s:
//! `Monotonic` never jumps, `Realtime` tracks the wall clock and may be
//! adjusted in either direction. Keeping the domains separate means a wall
//! clock step only ever re-evaluates realtime timers.
//!
//! The [`ClockSource`] trait abstracts where readings come from, so the
//! production [`SystemClock`] and the deterministic [`VirtualClock`] are
//! interchangeable.

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The clock domain a deadline is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
    /// Steady time counted from an arbitrary epoch. Never jumps.
    Monotonic,
    /// Wall-clock time. May jump forward or backward when adjusted.
    Realtime,
}

impl ClockDomain {
    /// Both domains, in the order fire sweeps them.
    pub const ALL: [Self; 2] = [Self::Monotonic, Self::Realtime];
}

/// Source of per-domain time readings.
///
/// Implementations must be cheap: readings are taken under queue locks.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in the given domain.
    fn now(&self, domain: ClockDomain) -> Time;
}

/// Production clock source.
///
/// The monotonic domain reads `std::time::Instant` elapsed since
/// construction; the realtime domain reads `SystemTime` since the Unix
/// epoch and observes wall-clock adjustments.
#[derive(Debug)]
pub struct SystemClock {
    /// The instant when this clock was created; the monotonic epoch.
    epoch: std::time::Instant,
}

impl SystemClock {
    /// Creates a system clock with its monotonic epoch at "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self, domain: ClockDomain) -> Time {
        match domain {
            ClockDomain::Monotonic => Time::from_nanos(self.epoch.elapsed().as_nanos() as u64),
            ClockDomain::Realtime => {
                // A wall clock set before 1970 reads as zero.
                let since_epoch = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Time::from_nanos(since_epoch.as_nanos() as u64)
            }
        }
    }
}

/// Deterministic clock source for tests.
///
/// Each domain advances only when explicitly told to. The realtime domain
/// can additionally be stepped backward to model a wall-clock adjustment.
///
/// # Example
///
/// ```
/// use snooze::{ClockDomain, ClockSource, Time, VirtualClock};
/// use std::time::Duration;
///
/// let clock = VirtualClock::new();
/// assert_eq!(clock.now(ClockDomain::Monotonic), Time::ZERO);
///
/// clock.advance(ClockDomain::Monotonic, Duration::from_secs(1));
/// assert_eq!(clock.now(ClockDomain::Monotonic), Time::from_secs(1));
/// assert_eq!(clock.now(ClockDomain::Realtime), Time::ZERO);
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    monotonic: AtomicU64,
    realtime: AtomicU64,
}

impl VirtualClock {
    /// Creates a virtual clock with both domains at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            monotonic: AtomicU64::new(0),
            realtime: AtomicU64::new(0),
        }
    }

    /// Advances a domain by the given duration.
    pub fn advance(&self, domain: ClockDomain, delta: Duration) {
        self.cell(domain)
            .fetch_add(delta.as_nanos() as u64, Ordering::Release);
    }

    /// Advances a domain to the given absolute time.
    ///
    /// If the target time is in the past, this is a no-op.
    pub fn advance_to(&self, domain: ClockDomain, time: Time) {
        let cell = self.cell(domain);
        let target = time.as_nanos();
        loop {
            let current = cell.load(Ordering::Acquire);
            if current >= target {
                break;
            }
            if cell
                .compare_exchange_weak(current, target, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Sets the realtime domain to an absolute reading, forward or backward.
    ///
    /// Models a wall-clock adjustment. The monotonic domain has no
    /// equivalent; it can only advance.
    pub fn set_realtime(&self, time: Time) {
        self.realtime.store(time.as_nanos(), Ordering::Release);
    }

    const fn cell(&self, domain: ClockDomain) -> &AtomicU64 {
        match domain {
            ClockDomain::Monotonic => &self.monotonic,
            ClockDomain::Realtime => &self.realtime,
        }
    }
}

impl ClockSource for VirtualClock {
    fn now(&self, domain: ClockDomain) -> Time {
        Time::from_nanos(self.cell(domain).load(Ordering::Acquire))
    }
}
