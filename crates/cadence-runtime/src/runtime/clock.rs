use std::{
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Millisecond time source paired with the sleep primitive the pacer uses.
///
/// The pacer only sleeps through the clock it measures with, so a simulated clock can
/// stand in for wall time.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_ms(&self) -> f64;

    /// Blocks the calling thread for roughly `ms` milliseconds.
    fn sleep_ms(&self, ms: f64);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn sleep_ms(&self, ms: f64) {
        if ms.is_finite() && ms > 0.0 {
            thread::sleep(Duration::from_secs_f64(ms / 1000.0));
        }
    }
}

/// Deterministic clock that only moves when told to.
///
/// Sleeping advances the clock by the requested amount plus a fixed oversleep, which
/// makes scheduler overshoot reproducible. Useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Mutex<f64>,
    oversleep_ms: f64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep overshoots its request by `oversleep_ms`.
    pub fn with_oversleep(oversleep_ms: f64) -> Self {
        Self {
            now_ms: Mutex::new(0.0),
            oversleep_ms: oversleep_ms.max(0.0),
        }
    }

    pub fn advance(&self, ms: f64) {
        if ms.is_finite() && ms > 0.0 {
            *self.now_ms.lock() += ms;
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now_ms.lock()
    }

    fn sleep_ms(&self, ms: f64) {
        if ms.is_finite() && ms > 0.0 {
            *self.now_ms.lock() += ms + self.oversleep_ms;
        }
        // Let the other threads in, the way a real sleep would.
        thread::yield_now();
    }
}
