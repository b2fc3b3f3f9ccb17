//! Monotonic clock abstraction.
//!
//! Scheduling decisions (spec §9, "Date.now() for scheduling") must use a
//! monotonic source, never wall-clock time. This trait lets tests substitute
//! a fake clock instead of sleeping real time; production code uses
//! [`SystemClock`], which is just [`std::time::Instant`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A monotonic clock. `now()` must never go backwards.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// The real system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose time only advances when [`FakeClock::advance`] is called.
///
/// Useful for deterministically testing boundary scenarios from spec §8
/// (e.g. "remaining hits 0 before resetAtMs") without real sleeps.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock().unwrap()
    }
}
