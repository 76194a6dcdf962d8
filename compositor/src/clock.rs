//! Clock abstraction for pointer-event timestamps.
//!
//! Production code uses `SystemClock` (monotonic, relative to process start).
//! Tests use `TestClock` with manual time advancement.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Trait abstracting time sources for testability.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Microseconds elapsed since the clock's origin.
    fn timestamp_micros(&self) -> u64;
}

/// Production clock using real monotonic time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Test clock with manually controlled time. Starts at timestamp 0.
pub struct TestClock {
    origin: Instant,
    instant: Mutex<Instant>,
}

impl TestClock {
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            instant: Mutex::new(origin),
        }
    }

    /// Advance time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut inst = self.instant.lock().unwrap_or_else(|p| p.into_inner());
        *inst += duration;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.instant.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn timestamp_micros(&self) -> u64 {
        (self.now() - self.origin).as_micros() as u64
    }
}
