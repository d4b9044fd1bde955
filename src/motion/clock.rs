//! Wall clock abstraction so darkness sleeps can be simulated.

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of time and of blocking sleeps.
pub trait Clock {
    /// Current local time.
    fn now(&self) -> DateTime<Local>;
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to. `sleep` returns immediately
/// after advancing the clock.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
    slept: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now = *now + delta;
        }
    }

    /// Total time spent in `sleep`.
    pub fn total_slept(&self) -> Duration {
        self.slept.lock().map(|d| *d).unwrap_or_default()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Local::now())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        if let Ok(mut slept) = self.slept.lock() {
            *slept += duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        let handle = clock.clone();

        clock.sleep(Duration::from_secs(600));

        assert_eq!((handle.now() - start).num_seconds(), 600);
        assert_eq!(handle.total_slept(), Duration::from_secs(600));
    }
}
