//! Time source seam.
//!
//! The access-unit heuristics and the timestamp baseline need wall-clock
//! readings, but the demuxer core stays off the system clock so tests can
//! drive time explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source, in seconds from an arbitrary epoch.
pub trait Clock {
    /// Current monotonic time in seconds.
    fn now(&self) -> f64;
}

/// Clock backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at construction time.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for tests.
///
/// Clones share the same time value, so a test can keep a handle while the
/// demuxer owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute time in seconds.
    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::SeqCst);
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        assert_eq!(clock.now(), 0.0);
        handle.set(1.5);
        assert_eq!(clock.now(), 1.5);
        handle.advance(0.5);
        assert_eq!(clock.now(), 2.0);
    }
}
