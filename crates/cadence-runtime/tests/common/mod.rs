#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use cadence_runtime::{Engine, EngineEvent, RewindSnapshot};
use parking_lot::Mutex;

pub const LINES_PER_FRAME: u32 = 263;
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start,
    Step,
    Pause,
    Resume,
    Reset,
    Mutate,
    Save,
    Load,
    Snapshot(u32),
    Stop,
}

type Checker = Box<dyn Fn() -> bool + Send + Sync>;

/// Shared record of everything the engine was asked to do.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    steps: AtomicU64,
    violations: AtomicU32,
    fail_mutations: AtomicBool,
    panic_at_step: AtomicU64,
    step_delay_ms: AtomicU64,
    thread_names: Mutex<Vec<String>>,
    /// Must hold whenever the engine is mutated (usually "worker really paused").
    checker: Mutex<Option<Checker>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls other than `Step`, in order.
    pub fn lifecycle_calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call != Call::Step)
            .cloned()
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn panic_at_step(&self, step: u64) {
        self.panic_at_step.store(step, Ordering::SeqCst);
    }

    /// Makes every following step block for `delay`.
    pub fn set_step_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.step_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Names of the threads `on_start` and `on_stop` ran on.
    pub fn thread_names(&self) -> Vec<String> {
        self.thread_names.lock().clone()
    }

    pub fn set_checker(&self, checker: impl Fn() -> bool + Send + Sync + 'static) {
        *self.checker.lock() = Some(Box::new(checker));
    }

    /// Drops the checker (and whatever handle it captured).
    pub fn clear_checker(&self) {
        self.checker.lock().take();
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn record_thread(&self) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        self.thread_names.lock().push(name);
    }

    fn mutate(&self, call: Call) -> bool {
        if let Some(checker) = self.checker.lock().as_ref() {
            if !checker() {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.record(call);
        !self.fail_mutations.load(Ordering::SeqCst)
    }
}

/// Engine that renders nothing but records every call into a [`Recorder`].
pub struct RecordingEngine {
    recorder: Arc<Recorder>,
    pending: Vec<EngineEvent>,
}

impl RecordingEngine {
    pub fn new(recorder: &Arc<Recorder>) -> Self {
        Self {
            recorder: Arc::clone(recorder),
            pending: Vec::new(),
        }
    }

    /// A host-defined mutation, checked like the built-in ones.
    pub fn poke(&mut self) -> bool {
        self.recorder.mutate(Call::Mutate)
    }
}

impl Engine for RecordingEngine {
    fn step_frame(&mut self) -> u32 {
        let step = self.recorder.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if step == self.recorder.panic_at_step.load(Ordering::SeqCst) {
            panic!("recording engine failed at step {step}");
        }
        let delay = self.recorder.step_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if step == 1 {
            self.pending.push(EngineEvent::RumbleStart { duration_ms: 40 });
        }
        self.recorder.record(Call::Step);
        LINES_PER_FRAME
    }

    fn on_start(&mut self) {
        self.recorder.record_thread();
        self.recorder.record(Call::Start);
    }

    fn on_stop(&mut self) {
        self.recorder.record_thread();
        self.recorder.record(Call::Stop);
    }

    fn on_pause(&mut self) {
        self.recorder.record(Call::Pause);
    }

    fn on_resume(&mut self) {
        self.recorder.record(Call::Resume);
    }

    fn reset(&mut self) -> bool {
        self.recorder.mutate(Call::Reset)
    }

    fn save_state(&mut self, _path: &Path) -> bool {
        self.recorder.record(Call::Save);
        !self.recorder.fail_mutations.load(Ordering::SeqCst)
    }

    fn load_state(&mut self, _path: &Path) -> bool {
        self.recorder.mutate(Call::Load)
    }

    fn load_snapshot(&mut self, snapshot: &RewindSnapshot<'_>) -> bool {
        self.recorder.mutate(Call::Snapshot(snapshot.frame))
    }

    fn drain_events(&mut self, events: &mut Vec<EngineEvent>) {
        events.append(&mut self.pending);
    }
}

/// Polls `cond` until it holds or [`WAIT_TIMEOUT`] passes.
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
