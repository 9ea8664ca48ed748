use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};

use cadence_runtime::{Engine, EngineEvent, RewindSnapshot};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

const LINES_PER_FRAME: u32 = 263;
const RUMBLE_EVERY_FRAMES: u64 = 240;
const RUMBLE_MS: u32 = 80;
const RUMBLE_FRAMES: u64 = 30;

/// Stand-in for an emulator core: burns CPU in proportion to the lines it renders.
pub struct SyntheticEngine {
    work_per_frame: Duration,
    jitter: Duration,
    lines_per_step: u32,
    rng: StdRng,
    /// Lines rendered into the current frame.
    line: u32,
    frame: u64,
    rumble_until: Option<u64>,
    pending: Vec<EngineEvent>,
}

impl SyntheticEngine {
    pub fn new(
        work_per_frame: Duration,
        jitter: Duration,
        lines_per_step: u32,
        seed: u64,
    ) -> Self {
        Self {
            work_per_frame,
            jitter,
            lines_per_step: lines_per_step.clamp(1, LINES_PER_FRAME),
            rng: StdRng::seed_from_u64(seed),
            line: 0,
            frame: 0,
            rumble_until: None,
            pending: Vec::new(),
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Serialized state: the frame counter, little endian.
    pub fn snapshot_bytes(&self) -> [u8; 8] {
        self.frame.to_le_bytes()
    }

    fn restore(&mut self, bytes: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 8]>::try_from(bytes) else {
            warn!(len = bytes.len(), "state blob has the wrong size");
            return false;
        };
        self.frame = u64::from_le_bytes(bytes);
        self.line = 0;
        true
    }

    fn busy_work(&mut self, lines: u32) {
        let share = f64::from(lines) / f64::from(LINES_PER_FRAME);
        let mut budget = self.work_per_frame.as_secs_f64() * share;
        if !self.jitter.is_zero() {
            let jitter = self.jitter.as_secs_f64() * share;
            budget += self.rng.random_range(-jitter..=jitter);
        }
        let deadline = Instant::now() + Duration::from_secs_f64(budget.max(0.0));
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

impl Engine for SyntheticEngine {
    fn step_frame(&mut self) -> u32 {
        let lines = self.lines_per_step.min(LINES_PER_FRAME - self.line);
        self.busy_work(lines);

        self.line += lines;
        if self.line == LINES_PER_FRAME {
            self.line = 0;
            self.frame += 1;
            if self.frame % RUMBLE_EVERY_FRAMES == 0 {
                self.pending.push(EngineEvent::RumbleStart {
                    duration_ms: RUMBLE_MS,
                });
                self.rumble_until = Some(self.frame + RUMBLE_FRAMES);
            } else if self.rumble_until == Some(self.frame) {
                self.pending.push(EngineEvent::RumbleStop);
                self.rumble_until = None;
            }
        }
        lines
    }

    fn on_start(&mut self) {
        debug!(frame = self.frame, "synthetic engine started");
    }

    fn on_stop(&mut self) {
        debug!(frame = self.frame, "synthetic engine stopped");
    }

    fn reset(&mut self) -> bool {
        self.frame = 0;
        self.line = 0;
        self.rumble_until = None;
        self.pending.clear();
        true
    }

    fn save_state(&mut self, path: &Path) -> bool {
        match fs::write(path, self.snapshot_bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write state");
                false
            }
        }
    }

    fn load_state(&mut self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(bytes) => self.restore(&bytes),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read state");
                false
            }
        }
    }

    fn load_snapshot(&mut self, snapshot: &RewindSnapshot<'_>) -> bool {
        self.restore(snapshot.buffer)
    }

    fn drain_events(&mut self, events: &mut Vec<EngineEvent>) {
        events.append(&mut self.pending);
    }
}
