use crossbeam_channel::Sender;

use super::{
    engine::EngineEvent,
    pacing::{DEFAULT_LINES_PER_FRAME, PacingTarget},
};

pub(crate) const DEFAULT_TARGET_FPS: f64 = 60.0;
pub(crate) const DEFAULT_FAST_FORWARD_MULTIPLIER: f32 = 3.0;
pub(crate) const DEFAULT_FPS_WINDOW_FRAMES: u32 = 30;
pub(crate) const WORKER_THREAD_NAME: &str = "emulator-thread";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    /// Base frame rate the pacer aims for.
    pub target_fps: f64,
    /// Scanlines per emulated frame, vblank included.
    pub lines_per_frame: u32,
    /// Rate multiplier while fast-forwarding. `0` runs unthrottled.
    pub fast_forward_multiplier: f32,
    /// Frames per observed-FPS measurement.
    pub fps_window_frames: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            lines_per_frame: DEFAULT_LINES_PER_FRAME,
            fast_forward_multiplier: DEFAULT_FAST_FORWARD_MULTIPLIER,
            fps_window_frames: DEFAULT_FPS_WINDOW_FRAMES,
        }
    }
}

impl RuntimeConfig {
    /// Checks the rates and replaces zero counts with their defaults.
    pub(crate) fn validated(mut self) -> Result<Self, RuntimeError> {
        validate_fps(self.target_fps)?;
        validate_multiplier(self.fast_forward_multiplier)?;
        if self.lines_per_frame == 0 {
            self.lines_per_frame = DEFAULT_LINES_PER_FRAME;
        }
        if self.fps_window_frames == 0 {
            self.fps_window_frames = DEFAULT_FPS_WINDOW_FRAMES;
        }
        Ok(self)
    }
}

pub(crate) fn validate_fps(fps: f64) -> Result<(), RuntimeError> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(RuntimeError::InvalidTargetRate { fps })
    }
}

pub(crate) fn validate_multiplier(multiplier: f32) -> Result<(), RuntimeError> {
    if multiplier.is_finite() && multiplier >= 0.0 {
        Ok(())
    } else {
        Err(RuntimeError::InvalidFastForwardMultiplier { multiplier })
    }
}

/// Rate settings shared between host threads and the worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRate {
    pub fps: f64,
    pub fast_forward_multiplier: f32,
    pub fast_forward: bool,
}

impl TargetRate {
    pub(crate) fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            fps: config.target_fps,
            fast_forward_multiplier: config.fast_forward_multiplier,
            fast_forward: false,
        }
    }

    /// What the pacer should aim for right now.
    pub fn pacing(&self) -> PacingTarget {
        if self.fast_forward {
            let multiplier = f64::from(self.fast_forward_multiplier);
            PacingTarget {
                fps: self.fps * multiplier,
                limit: multiplier > 0.0,
            }
        } else {
            PacingTarget {
                fps: self.fps,
                limit: true,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Lifecycle,
    Frame,
    Rumble,
    Achievement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Started,
    Paused,
    Resumed,
    Stopped,
    Reset,
    StateRestored,
    FrameRendered { frame: u64, lines: u32 },
    RumbleStart { duration_ms: u32 },
    RumbleStop,
    AchievementTriggered { id: u64 },
    AchievementProgress { id: u64, current: u32, target: u32 },
    LeaderboardAttempt { id: u64, value: i64 },
}

impl RuntimeEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Started
            | Self::Paused
            | Self::Resumed
            | Self::Stopped
            | Self::Reset
            | Self::StateRestored => EventTopic::Lifecycle,
            Self::FrameRendered { .. } => EventTopic::Frame,
            Self::RumbleStart { .. } | Self::RumbleStop => EventTopic::Rumble,
            Self::AchievementTriggered { .. }
            | Self::AchievementProgress { .. }
            | Self::LeaderboardAttempt { .. } => EventTopic::Achievement,
        }
    }
}

impl From<EngineEvent> for RuntimeEvent {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::RumbleStart { duration_ms } => Self::RumbleStart { duration_ms },
            EngineEvent::RumbleStop => Self::RumbleStop,
            EngineEvent::AchievementTriggered { id } => Self::AchievementTriggered { id },
            EngineEvent::AchievementProgress {
                id,
                current,
                target,
            } => Self::AchievementProgress {
                id,
                current,
                target,
            },
            EngineEvent::LeaderboardAttempt { id, value } => {
                Self::LeaderboardAttempt { id, value }
            }
        }
    }
}

/// Host-side listener for runtime events.
///
/// Returning `false` from `send` marks the listener as disconnected; it is dropped
/// and receives nothing further. `send` runs on whichever thread raised the event,
/// with the subscriber table locked, and must not call back into the runtime.
pub trait RuntimeEventSender: Send + 'static {
    fn send(&self, event: RuntimeEvent) -> bool;
}

impl RuntimeEventSender for Box<dyn RuntimeEventSender> {
    fn send(&self, event: RuntimeEvent) -> bool {
        (**self).send(event)
    }
}

impl RuntimeEventSender for Sender<RuntimeEvent> {
    fn send(&self, event: RuntimeEvent) -> bool {
        Sender::send(self, event).is_ok()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("emulator thread is already running")]
    AlreadyRunning,
    #[error("failed to spawn emulator thread: {error}")]
    SpawnFailed { error: String },
    #[error("engine rejected {op}")]
    EngineOperationFailed { op: &'static str },
    #[error("emulator thread exited before reaching its pause point")]
    WorkerExited,
    #[error("invalid target frame rate: {fps}")]
    InvalidTargetRate { fps: f64 },
    #[error("invalid fast-forward multiplier: {multiplier}")]
    InvalidFastForwardMultiplier { multiplier: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counts_fall_back_to_defaults() {
        let config = RuntimeConfig {
            lines_per_frame: 0,
            fps_window_frames: 0,
            ..RuntimeConfig::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.lines_per_frame, 263);
        assert_eq!(config.fps_window_frames, 30);
    }

    #[test]
    fn bad_rates_are_rejected() {
        for fps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = RuntimeConfig {
                target_fps: fps,
                ..RuntimeConfig::default()
            };
            assert!(matches!(
                config.validated(),
                Err(RuntimeError::InvalidTargetRate { .. })
            ));
        }

        let config = RuntimeConfig {
            fast_forward_multiplier: -0.5,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            config.validated(),
            Err(RuntimeError::InvalidFastForwardMultiplier { .. })
        ));

        // Zero is the unthrottled multiplier, not an error.
        let config = RuntimeConfig {
            fast_forward_multiplier: 0.0,
            ..RuntimeConfig::default()
        };
        assert!(config.validated().is_ok());
    }

    #[test]
    fn pacing_follows_fast_forward() {
        let mut rate = TargetRate::from_config(&RuntimeConfig::default());
        assert_eq!(
            rate.pacing(),
            PacingTarget {
                fps: 60.0,
                limit: true
            }
        );

        rate.fast_forward = true;
        assert_eq!(
            rate.pacing(),
            PacingTarget {
                fps: 180.0,
                limit: true
            }
        );

        rate.fast_forward_multiplier = 0.0;
        assert!(!rate.pacing().limit);

        // The multiplier only matters while fast-forward is on.
        rate.fast_forward = false;
        assert_eq!(
            rate.pacing(),
            PacingTarget {
                fps: 60.0,
                limit: true
            }
        );
    }

    #[test]
    fn engine_events_map_to_their_topics() {
        let rumble: RuntimeEvent = EngineEvent::RumbleStart { duration_ms: 40 }.into();
        assert_eq!(rumble, RuntimeEvent::RumbleStart { duration_ms: 40 });
        assert_eq!(rumble.topic(), EventTopic::Rumble);

        let progress: RuntimeEvent = EngineEvent::AchievementProgress {
            id: 7,
            current: 3,
            target: 10,
        }
        .into();
        assert_eq!(progress.topic(), EventTopic::Achievement);

        assert_eq!(RuntimeEvent::StateRestored.topic(), EventTopic::Lifecycle);
        assert_eq!(
            RuntimeEvent::FrameRendered { frame: 1, lines: 263 }.topic(),
            EventTopic::Frame
        );
    }

    #[test]
    fn channel_sender_reports_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(RuntimeEventSender::send(&tx, RuntimeEvent::Started));
        assert_eq!(rx.try_recv().ok(), Some(RuntimeEvent::Started));

        drop(rx);
        assert!(!RuntimeEventSender::send(&tx, RuntimeEvent::Stopped));
    }
}
