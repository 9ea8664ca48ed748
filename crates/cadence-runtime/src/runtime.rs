//! Emulator thread controller.
//!
//! A [`Runtime`] owns one emulation worker thread at a time. Host threads drive it
//! through a cloneable [`RuntimeHandle`]: start/stop the session, pause/resume the
//! worker, and run state-mutating engine operations (reset, state loads) only once the
//! worker is parked at its pause checkpoint.
//!
//! ```text
//!  host threads                          emulator-thread
//!  ────────────                          ───────────────
//!  pause()  ──► Running → PauseRequested
//!                                        checkpoint: → Paused, really_paused = true
//!  reset_synchronized()                  (blocked on condvar)
//!    wait really_paused, engine.reset()
//!  resume() ──► Paused → Running  ─────► wakes, really_paused = false
//!                                        step_frame() → pacer sleeps → repeat
//! ```

mod clock;
mod engine;
mod handle;
mod pacing;
mod pubsub;
mod runner;
mod state;
mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use engine::{Engine, EngineEvent, RewindSnapshot};
pub use handle::{Runtime, RuntimeHandle};
pub use pacing::{FpsCounter, Pacer, PacingTarget};
pub use state::RunState;
pub use types::{
    EventTopic, RuntimeConfig, RuntimeError, RuntimeEvent, RuntimeEventSender, TargetRate,
};
