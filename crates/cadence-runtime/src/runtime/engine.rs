use std::path::Path;

/// The emulator core driven by the runtime.
///
/// The runtime keeps the engine behind a mutex and only ever calls into it from one
/// thread at a time: the worker during a step, or a host thread inside a synchronized
/// operation while the worker is parked at its pause checkpoint. `save_state`,
/// `on_pause` and `on_resume` are the exceptions; they run on the calling host thread
/// between two steps without waiting for the pause checkpoint.
pub trait Engine: Send + 'static {
    /// Runs one step and returns the number of scanlines it rendered.
    ///
    /// A step may end on an intermediate sync point, so the line count (not the step
    /// count) is what the pacer budgets against.
    fn step_frame(&mut self) -> u32;

    /// Called on the worker thread before the first step of a session.
    fn on_start(&mut self) {}

    /// Called on the worker thread after the last step of a session.
    fn on_stop(&mut self) {}

    /// Called on the host thread after a pause request took effect.
    fn on_pause(&mut self) {}

    /// Called on the host thread after a resume took effect.
    fn on_resume(&mut self) {}

    fn reset(&mut self) -> bool;

    fn save_state(&mut self, path: &Path) -> bool;

    fn load_state(&mut self, path: &Path) -> bool;

    /// Restores an in-memory rewind snapshot. The byte layout is the engine's own.
    fn load_snapshot(&mut self, snapshot: &RewindSnapshot<'_>) -> bool;

    /// Moves events raised during the last step into `events`.
    ///
    /// Called on the worker thread after every step; the runtime broadcasts them to
    /// the host subscribers of the matching topic.
    fn drain_events(&mut self, _events: &mut Vec<EngineEvent>) {}
}

/// One entry of the rewind buffer, borrowed from the host.
#[derive(Debug, Clone, Copy)]
pub struct RewindSnapshot<'a> {
    /// Serialized state (only the filled part of the host buffer).
    pub buffer: &'a [u8],
    /// Screen capture taken when the state was recorded.
    pub screenshot: &'a [u8],
    /// Emulated frame number the state was recorded at.
    pub frame: u32,
}

/// Peripheral and achievement events raised by the engine during a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    RumbleStart { duration_ms: u32 },
    RumbleStop,
    AchievementTriggered { id: u64 },
    AchievementProgress { id: u64, current: u32, target: u32 },
    LeaderboardAttempt { id: u64, value: i64 },
}
