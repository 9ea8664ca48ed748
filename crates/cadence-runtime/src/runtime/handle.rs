use std::{
    ops::Deref,
    path::Path,
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{
    clock::{Clock, MonotonicClock},
    engine::{Engine, RewindSnapshot},
    pacing::{FpsCounter, Pacer},
    pubsub::RuntimePubSub,
    runner::{Runner, SharedPubSub},
    state::{Quiesce, RunState, RuntimeState, ThreadState},
    types::{
        EventTopic, RuntimeConfig, RuntimeError, RuntimeEvent, RuntimeEventSender, TargetRate,
        WORKER_THREAD_NAME, validate_fps, validate_multiplier,
    },
};

struct RuntimeInner<E: Engine> {
    engine: Arc<Mutex<E>>,
    /// Join handle of the live worker. Held across the whole of `start`/`stop` so
    /// lifecycle calls from different threads are serialized.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    /// State machine of the live session, or `None` when no worker was started.
    thread: Mutex<Option<Arc<ThreadState>>>,
    state: Arc<RuntimeState>,
    pubsub: SharedPubSub,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
}

impl<E: Engine> Drop for RuntimeInner<E> {
    fn drop(&mut self) {
        let Some(join) = self.lifecycle.get_mut().take() else {
            return;
        };
        if let Some(thread) = self.thread.get_mut().take() {
            thread.request_stop();
        }
        // The last handle can only go away on the worker if the engine owns one.
        if join.thread().id() == thread::current().id() {
            warn!("last runtime handle dropped on the emulator thread, not joining");
            return;
        }
        if join.join().is_err() {
            warn!("emulator thread panicked");
        }
        debug!("emulator thread joined on last handle drop");
    }
}

/// Owner of the emulator thread. Dropping it stops and joins the worker.
pub struct Runtime<E: Engine> {
    handle: RuntimeHandle<E>,
}

/// Cloneable control surface, usable from any host thread except the worker itself.
///
/// A handle may outlive its [`Runtime`] and keep starting sessions; the worker is
/// then stopped and joined when the last handle is dropped.
pub struct RuntimeHandle<E: Engine> {
    inner: Arc<RuntimeInner<E>>,
}

impl<E: Engine> Clone for RuntimeHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> Runtime<E> {
    /// Builds a stopped runtime around `engine`, paced by the wall clock.
    pub fn new(engine: E, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_clock(engine, config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        engine: E,
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let config = config.validated()?;
        let inner = Arc::new(RuntimeInner {
            engine: Arc::new(Mutex::new(engine)),
            lifecycle: Mutex::new(None),
            thread: Mutex::new(None),
            state: Arc::new(RuntimeState::new(TargetRate::from_config(&config))),
            pubsub: Arc::new(Mutex::new(RuntimePubSub::new())),
            clock,
            config,
        });

        Ok(Self {
            handle: RuntimeHandle { inner },
        })
    }

    pub fn handle(&self) -> RuntimeHandle<E> {
        self.handle.clone()
    }
}

impl<E: Engine> Deref for Runtime<E> {
    type Target = RuntimeHandle<E>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<E: Engine> Drop for Runtime<E> {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

impl<E: Engine> RuntimeHandle<E> {
    fn current_thread(&self) -> Option<Arc<ThreadState>> {
        self.inner.thread.lock().clone()
    }

    fn publish(&self, event: RuntimeEvent) {
        self.inner.pubsub.lock().broadcast(event);
    }

    /// Spawns the emulator thread and starts a fresh session.
    ///
    /// Fast-forward is switched off and the frame and FPS counters are cleared.
    /// Starting twice without a `stop` in between is a caller bug: it asserts in debug
    /// builds and returns [`RuntimeError::AlreadyRunning`] otherwise.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        let running = lifecycle.is_some();
        debug_assert!(!running, "start() called while the emulator thread is running");
        if running {
            warn!("start() called while the emulator thread is running");
            return Err(RuntimeError::AlreadyRunning);
        }

        self.inner.state.reset_session();
        let thread_state = Arc::new(ThreadState::new());
        let config = self.inner.config;
        let now = self.inner.clock.now_ms();

        let runner = Runner::new(
            Arc::clone(&self.inner.engine),
            Arc::clone(&thread_state),
            Arc::clone(&self.inner.state),
            Arc::clone(&self.inner.pubsub),
            Arc::clone(&self.inner.clock),
            Pacer::new(config.lines_per_frame, now),
            FpsCounter::new(config.fps_window_frames, now),
        );

        let join = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || runner.run())
            .map_err(|e| {
                warn!(error = %e, "failed to spawn emulator thread");
                RuntimeError::SpawnFailed {
                    error: e.to_string(),
                }
            })?;

        *self.inner.thread.lock() = Some(thread_state);
        *lifecycle = Some(join);
        debug!(target_fps = config.target_fps, "emulator thread spawned");
        Ok(())
    }

    /// Stops the session and blocks until the worker has run `on_stop` and exited.
    ///
    /// Does nothing when no worker is running.
    pub fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        let Some(join) = lifecycle.take() else {
            return;
        };

        if let Some(thread) = self.current_thread() {
            thread.request_stop();
        }
        if join.join().is_err() {
            warn!("emulator thread panicked");
        }
        *self.inner.thread.lock() = None;
        info!("emulator thread joined");
    }

    /// Asks the worker to park at its next iteration boundary. Returns immediately.
    pub fn pause(&self) {
        if let Some(thread) = self.current_thread() {
            self.pause_thread(&thread);
        }
    }

    pub fn resume(&self) {
        if let Some(thread) = self.current_thread() {
            self.resume_thread(&thread);
        }
    }

    fn pause_thread(&self, thread: &ThreadState) -> bool {
        if !thread.request_pause() {
            return false;
        }
        self.inner.engine.lock().on_pause();
        debug!("emulator pause requested");
        self.publish(RuntimeEvent::Paused);
        true
    }

    fn resume_thread(&self, thread: &ThreadState) -> bool {
        if !thread.request_resume() {
            return false;
        }
        self.inner.engine.lock().on_resume();
        debug!("emulator resumed");
        self.publish(RuntimeEvent::Resumed);
        true
    }

    /// Runs `f` on the engine once the worker is parked, pausing and resuming around
    /// it unless the caller had already paused. A host `resume` that lands during the
    /// wait is honoured once `f` is done.
    ///
    /// `Ok(None)` means there was no session to synchronize with.
    fn synchronized<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut E) -> T,
    ) -> Result<Option<T>, RuntimeError> {
        let Some(thread) = self.current_thread() else {
            debug!(op, "emulator not running, skipping");
            return Ok(None);
        };

        let paused_here = self.pause_thread(&thread);
        let outcome = thread.with_quiesced(|| f(&mut *self.inner.engine.lock()));
        if paused_here {
            self.resume_thread(&thread);
        }

        match outcome {
            Quiesce::Done(value) => Ok(Some(value)),
            Quiesce::Stopped => {
                debug!(op, "emulator stopped before reaching its pause point");
                Ok(None)
            }
            Quiesce::WorkerExited => {
                warn!(op, "emulator thread is gone");
                Err(RuntimeError::WorkerExited)
            }
        }
    }

    fn finish(
        &self,
        op: &'static str,
        outcome: Option<bool>,
        event: Option<RuntimeEvent>,
    ) -> Result<(), RuntimeError> {
        match outcome {
            Some(true) => {
                debug!(op, "engine operation applied");
                if let Some(event) = event {
                    self.publish(event);
                }
                Ok(())
            }
            Some(false) => {
                warn!(op, "engine operation failed");
                Err(RuntimeError::EngineOperationFailed { op })
            }
            None => Ok(()),
        }
    }

    /// Resets the engine between two steps. A paused emulator stays paused.
    pub fn reset_synchronized(&self) -> Result<(), RuntimeError> {
        let outcome = self.synchronized("reset", E::reset)?;
        self.finish("reset", outcome, Some(RuntimeEvent::Reset))
    }

    /// Runs an arbitrary engine mutation between two steps.
    ///
    /// `f` returns whether it succeeded; a failure is reported as
    /// [`RuntimeError::EngineOperationFailed`] tagged with `op`. The pause bracketing
    /// is undone either way.
    pub fn mutate_state_synchronized(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut E) -> bool,
    ) -> Result<(), RuntimeError> {
        let outcome = self.synchronized(op, f)?;
        self.finish(op, outcome, None)
    }

    pub fn load_state_synchronized(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let path = path.as_ref();
        let outcome = self.synchronized("load_state", |engine| engine.load_state(path))?;
        self.finish("load_state", outcome, Some(RuntimeEvent::StateRestored))
    }

    pub fn load_snapshot_synchronized(
        &self,
        snapshot: &RewindSnapshot<'_>,
    ) -> Result<(), RuntimeError> {
        let outcome =
            self.synchronized("load_snapshot", |engine| engine.load_snapshot(snapshot))?;
        self.finish("load_snapshot", outcome, Some(RuntimeEvent::StateRestored))
    }

    /// Writes a save state between two steps without pausing the worker.
    pub fn save_state_synchronized(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let saved = self.inner.engine.lock().save_state(path.as_ref());
        self.finish("save_state", Some(saved), None)
    }

    pub fn set_fast_forward(&self, enabled: bool) {
        self.inner.state.rate.lock().fast_forward = enabled;
        debug!(enabled, "fast-forward toggled");
    }

    /// Updates the fast-forward multiplier. `0` runs unthrottled.
    ///
    /// Applies from the next iteration when fast-forward is on.
    pub fn set_fast_forward_multiplier(&self, multiplier: f32) -> Result<(), RuntimeError> {
        validate_multiplier(multiplier)?;
        self.inner.state.rate.lock().fast_forward_multiplier = multiplier;
        debug!(multiplier, "fast-forward multiplier updated");
        Ok(())
    }

    pub fn set_target_rate(&self, fps: f64, multiplier: f32) -> Result<(), RuntimeError> {
        validate_fps(fps)?;
        validate_multiplier(multiplier)?;
        {
            let mut rate = self.inner.state.rate.lock();
            rate.fps = fps;
            rate.fast_forward_multiplier = multiplier;
        }
        debug!(fps, multiplier, "target rate updated");
        Ok(())
    }

    pub fn fast_forward(&self) -> bool {
        self.inner.state.rate.lock().fast_forward
    }

    pub fn target_rate(&self) -> TargetRate {
        *self.inner.state.rate.lock()
    }

    /// Frames per second measured over the last complete window. `0` until the first
    /// window of a session completes.
    pub fn observed_fps(&self) -> u32 {
        self.inner.state.observed_fps.load(Ordering::Relaxed)
    }

    /// Frames stepped in the current (or last) session.
    pub fn frame_count(&self) -> u64 {
        self.inner.state.frame_seq.load(Ordering::Relaxed)
    }

    pub fn run_state(&self) -> RunState {
        self.current_thread()
            .map_or(RunState::Stopped, |thread| thread.run_state())
    }

    /// `true` while a worker is alive and its session has not been stopped.
    pub fn is_running(&self) -> bool {
        self.current_thread().is_some_and(|thread| {
            thread.run_state() != RunState::Stopped && !thread.worker_exited()
        })
    }

    /// `true` only while the worker is blocked at its pause checkpoint.
    pub fn is_really_paused(&self) -> bool {
        self.current_thread()
            .is_some_and(|thread| thread.is_really_paused())
    }

    /// Routes every event of `topic` to `sender`, replacing any previous listener.
    pub fn subscribe_event(&self, topic: EventTopic, sender: Box<dyn RuntimeEventSender>) {
        self.inner.pubsub.lock().subscribe(topic, sender);
    }

    pub fn unsubscribe_event(&self, topic: EventTopic) -> bool {
        self.inner.pubsub.lock().unsubscribe(topic)
    }
}
