//! Time abstraction for the fetch engine.
//!
//! The engine never reads the wall clock directly. It is generic over a
//! [`TimeSource`] that reports a monotonic tick counter together with the
//! [`ClockRate`] those ticks run at:
//!
//! - [`RealTime`]: nanoseconds elapsed since construction
//! - [`VirtualTime`]: a shared counter that only moves when a test or the
//!   simulator steps it, for deterministic runs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Tick frequency of a [`TimeSource`].
///
/// Every component that turns configured durations into ticks, or ticks into
/// seconds, receives the rate explicitly at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockRate(u64);

impl ClockRate {
    /// One tick per nanosecond.
    pub const NANOS: Self = Self(NANOS_PER_SEC);

    /// Creates a rate of `hz` ticks per second.
    ///
    /// # Panics
    /// If `hz` is zero.
    pub const fn from_hz(hz: u64) -> Self {
        assert!(hz > 0, "clock rate must be non-zero");
        Self(hz)
    }

    /// Converts a duration into ticks, saturating at `u64::MAX`.
    pub fn ticks(&self, duration: Duration) -> u64 {
        let ticks = duration.as_nanos() * self.0 as u128 / NANOS_PER_SEC as u128;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Converts ticks back into a duration.
    pub fn duration(&self, ticks: u64) -> Duration {
        let nanos = ticks as u128 * NANOS_PER_SEC as u128 / self.0 as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Converts a (possibly fractional) tick count into seconds.
    pub fn secs(&self, ticks: f64) -> f64 {
        ticks / self.0 as f64
    }
}

impl Default for ClockRate {
    fn default() -> Self {
        Self::NANOS
    }
}

/// Source of monotonic timestamps for the engine.
pub trait TimeSource: Clone {
    /// Current time in ticks since an arbitrary epoch.
    fn now(&self) -> u64;

    /// Rate at which [`TimeSource::now`] advances.
    fn rate(&self) -> ClockRate {
        ClockRate::NANOS
    }
}

/// Monotonic wall-clock time, in nanoseconds since construction.
#[derive(Debug, Clone)]
pub struct RealTime {
    epoch: Instant,
}

impl Default for RealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl TimeSource for RealTime {
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Virtual time for deterministic tests and simulation.
///
/// Clones share the same counter, so a harness can keep one handle and step
/// time while the engine holds another.
#[derive(Debug, Clone)]
pub struct VirtualTime {
    current: Arc<AtomicU64>,
    rate: ClockRate,
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTime {
    /// Creates a nanosecond virtual clock starting at 0.
    pub fn new() -> Self {
        Self::with_rate(ClockRate::NANOS)
    }

    /// Creates a virtual clock starting at 0 that ticks at `rate`.
    pub fn with_rate(rate: ClockRate) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
            rate,
        }
    }

    /// Moves time forward by `duration`.
    pub fn advance(&self, duration: Duration) -> u64 {
        let delta = self.rate.ticks(duration);
        self.current.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Moves time forward to `ticks`. Going backwards is ignored.
    pub fn advance_to(&self, ticks: u64) -> u64 {
        self.current.fetch_max(ticks, Ordering::SeqCst).max(ticks)
    }
}

impl TimeSource for VirtualTime {
    fn now(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    fn rate(&self) -> ClockRate {
        self.rate
    }
}
