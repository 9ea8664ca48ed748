//! Frame pacing.
//!
//! The pacer keeps a signed error term `E` (ms) between the time the emulated work
//! should have taken and the time it actually took. Each step adds its budget and
//! subtracts the measured wall time; whenever `E` rounds to a positive number of
//! milliseconds the worker sleeps it off, and the *measured* sleep is subtracted so
//! scheduler overshoot is paid back on the following frames. `E` is clamped to one
//! step budget in either direction so a stall (host pause, debugger) does not turn
//! into a burst of catch-up frames.

use super::clock::Clock;

/// Scanlines in one emulated display frame, including vblank.
pub const DEFAULT_LINES_PER_FRAME: u32 = 263;

// All times are in ms.
const MIN_FRAME_TIME_MS: f64 = 1.0;
const UNTHROTTLED_YIELD_MS: f64 = 1.0;

/// Rate the worker should currently run at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingTarget {
    pub fps: f64,
    /// `false` runs unthrottled (fast-forward with no multiplier).
    pub limit: bool,
}

#[derive(Debug, Clone)]
pub struct Pacer {
    lines_per_frame: f64,
    error_ms: f64,
    last_tick_ms: f64,
}

impl Pacer {
    pub fn new(lines_per_frame: u32, now_ms: f64) -> Self {
        Self {
            lines_per_frame: f64::from(lines_per_frame.max(1)),
            error_ms: 0.0,
            last_tick_ms: now_ms,
        }
    }

    pub fn reset(&mut self, now_ms: f64) {
        self.error_ms = 0.0;
        self.last_tick_ms = now_ms;
    }

    /// Accumulated scheduling error in ms. Positive means the worker is ahead of
    /// wall time and owes a sleep.
    pub fn error_ms(&self) -> f64 {
        self.error_ms
    }

    /// Ideal wall duration of a step that rendered `lines` at `fps`.
    pub fn frame_time_step(&self, lines: u32, fps: f64) -> f64 {
        if !(fps.is_finite() && fps > 0.0) {
            return MIN_FRAME_TIME_MS;
        }
        let step = f64::from(lines) / (fps * self.lines_per_frame) * 1000.0;
        step.max(MIN_FRAME_TIME_MS)
    }

    /// Accounts for one step that rendered `lines` and sleeps as needed.
    ///
    /// Returns the measured time spent sleeping, in ms.
    pub fn regulate(&mut self, lines: u32, target: PacingTarget, clock: &dyn Clock) -> f64 {
        let mut current = clock.now_ms();
        let delay = current - self.last_tick_ms;
        let mut slept = 0.0;

        if target.limit {
            let step = self.frame_time_step(lines, target.fps);
            self.error_ms = (self.error_ms + step - delay).clamp(-step, step);

            if self.error_ms.round() > 0.0 {
                clock.sleep_ms(self.error_ms);
                let before_sleep = current;
                current = clock.now_ms();
                slept = current - before_sleep;
                self.error_ms -= slept;
            }

            self.last_tick_ms = current;
        } else {
            if delay < UNTHROTTLED_YIELD_MS {
                clock.sleep_ms(UNTHROTTLED_YIELD_MS);
                slept = clock.now_ms() - current;
            }

            self.last_tick_ms = clock.now_ms();
        }

        slept
    }
}

/// Observed frame rate, measured over fixed windows of frames.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: u32,
    frames: u32,
    last_measure_ms: f64,
}

impl FpsCounter {
    pub fn new(window: u32, now_ms: f64) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            last_measure_ms: now_ms,
        }
    }

    pub fn reset(&mut self, now_ms: f64) {
        self.frames = 0;
        self.last_measure_ms = now_ms;
    }

    /// Counts one frame. Returns a fresh measurement when a window completes.
    pub fn tick(&mut self, now_ms: f64) -> Option<u32> {
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }

        let elapsed = now_ms - self.last_measure_ms;
        let frames = self.frames;
        self.frames = 0;
        self.last_measure_ms = now_ms;

        if elapsed <= 0.0 {
            return None;
        }
        Some((f64::from(frames) * 1000.0 / elapsed).round() as u32)
    }
}
