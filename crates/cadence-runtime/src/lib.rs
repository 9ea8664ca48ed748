pub mod runtime;

pub use runtime::{
    Clock, Engine, EngineEvent, EventTopic, FpsCounter, ManualClock, MonotonicClock, Pacer,
    PacingTarget, RewindSnapshot, RunState, Runtime, RuntimeConfig, RuntimeError, RuntimeEvent,
    RuntimeEventSender, RuntimeHandle, TargetRate,
};
