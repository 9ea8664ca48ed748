use std::sync::{Arc, atomic::Ordering};

use parking_lot::Mutex;
use tracing::{info, trace};

use super::{
    clock::Clock,
    engine::{Engine, EngineEvent},
    pacing::{FpsCounter, Pacer},
    pubsub::RuntimePubSub,
    state::{RuntimeState, ThreadState},
    types::{RuntimeEvent, RuntimeEventSender},
};

pub(crate) type SharedPubSub = Arc<Mutex<RuntimePubSub<Box<dyn RuntimeEventSender>>>>;

/// Body of the emulator thread for one session.
pub(crate) struct Runner<E: Engine> {
    engine: Arc<Mutex<E>>,
    thread: Arc<ThreadState>,
    state: Arc<RuntimeState>,
    pubsub: SharedPubSub,
    clock: Arc<dyn Clock>,
    pacer: Pacer,
    fps: FpsCounter,
    events: Vec<EngineEvent>,
}

/// Flags the session as exited when the worker leaves `run`, unwinding included,
/// so synchronized callers never wait on a thread that is gone.
struct ExitGuard(Arc<ThreadState>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

impl<E: Engine> Runner<E> {
    pub(crate) fn new(
        engine: Arc<Mutex<E>>,
        thread: Arc<ThreadState>,
        state: Arc<RuntimeState>,
        pubsub: SharedPubSub,
        clock: Arc<dyn Clock>,
        pacer: Pacer,
        fps: FpsCounter,
    ) -> Self {
        Self {
            engine,
            thread,
            state,
            pubsub,
            clock,
            pacer,
            fps,
            events: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) {
        let _exit = ExitGuard(Arc::clone(&self.thread));

        self.engine.lock().on_start();
        info!("emulator thread started");
        self.publish(RuntimeEvent::Started);

        while self.thread.checkpoint() {
            self.step_frame();
        }

        self.engine.lock().on_stop();
        info!(
            frames = self.state.frame_seq.load(Ordering::Relaxed),
            "emulator thread stopped"
        );
        self.publish(RuntimeEvent::Stopped);
    }

    fn step_frame(&mut self) {
        let lines = {
            let mut engine = self.engine.lock();
            let lines = engine.step_frame();
            engine.drain_events(&mut self.events);
            lines
        };
        let frame = self.state.frame_seq.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut pubsub = self.pubsub.lock();
            for event in self.events.drain(..) {
                pubsub.broadcast(event.into());
            }
            pubsub.broadcast(RuntimeEvent::FrameRendered { frame, lines });
        }

        let target = self.state.rate.lock().pacing();
        self.pacer.regulate(lines, target, self.clock.as_ref());

        if let Some(fps) = self.fps.tick(self.clock.now_ms()) {
            self.state.observed_fps.store(fps, Ordering::Relaxed);
            trace!(fps, frame, "observed frame rate");
        }
    }

    fn publish(&self, event: RuntimeEvent) {
        self.pubsub.lock().broadcast(event);
    }
}
