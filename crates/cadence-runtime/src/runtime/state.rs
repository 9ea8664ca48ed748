use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::types::TargetRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    /// A pause was asked for; the worker has not reached its checkpoint yet.
    PauseRequested,
    Paused,
}

/// Outcome of waiting for the worker to park.
#[derive(Debug)]
pub(crate) enum Quiesce<T> {
    Done(T),
    Stopped,
    WorkerExited,
}

/// State machine of one worker session. A new one is built on every start.
pub(crate) struct ThreadState {
    run: Mutex<RunState>,
    cv: Condvar,
    /// Set only while the worker is blocked in its pause wait. Written under `run`.
    really_paused: AtomicBool,
    worker_exited: AtomicBool,
}

impl ThreadState {
    pub(crate) fn new() -> Self {
        Self {
            run: Mutex::new(RunState::Running),
            cv: Condvar::new(),
            really_paused: AtomicBool::new(false),
            worker_exited: AtomicBool::new(false),
        }
    }

    pub(crate) fn run_state(&self) -> RunState {
        *self.run.lock()
    }

    pub(crate) fn is_really_paused(&self) -> bool {
        self.really_paused.load(Ordering::Acquire)
    }

    pub(crate) fn worker_exited(&self) -> bool {
        self.worker_exited.load(Ordering::Acquire)
    }

    /// `Running → PauseRequested`. Returns whether the transition applied.
    ///
    /// Refused once the worker has exited.
    pub(crate) fn request_pause(&self) -> bool {
        let mut run = self.run.lock();
        if *run != RunState::Running || self.worker_exited() {
            return false;
        }
        *run = RunState::PauseRequested;
        true
    }

    /// `PauseRequested | Paused → Running`. Returns whether the transition applied.
    pub(crate) fn request_resume(&self) -> bool {
        let mut run = self.run.lock();
        if !matches!(*run, RunState::PauseRequested | RunState::Paused) || self.worker_exited() {
            return false;
        }
        *run = RunState::Running;
        self.cv.notify_all();
        true
    }

    /// Moves to `Stopped` from any state and wakes every waiter.
    pub(crate) fn request_stop(&self) -> bool {
        let mut run = self.run.lock();
        let changed = *run != RunState::Stopped;
        *run = RunState::Stopped;
        self.cv.notify_all();
        changed
    }

    /// Worker-side iteration boundary.
    ///
    /// Parks while a pause is requested or in effect and returns `false` once the
    /// session is stopped.
    pub(crate) fn checkpoint(&self) -> bool {
        let mut run = self.run.lock();
        if matches!(*run, RunState::PauseRequested | RunState::Paused) {
            while matches!(*run, RunState::PauseRequested | RunState::Paused) {
                *run = RunState::Paused;
                self.really_paused.store(true, Ordering::Release);
                self.cv.notify_all();
                self.cv.wait(&mut run);
            }
            self.really_paused.store(false, Ordering::Release);
        }
        *run != RunState::Stopped
    }

    /// Called once by the worker on its way out, including when it unwinds.
    pub(crate) fn mark_exited(&self) {
        let _run = self.run.lock();
        self.really_paused.store(false, Ordering::Release);
        self.worker_exited.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    /// Blocks until the worker is parked at its checkpoint, then runs `f` with the
    /// state lock held so the worker cannot resume underneath it.
    ///
    /// If the worker is running (nobody paused it, or another thread resumed it in
    /// the meantime) the pause is requested here, and lifted again before returning
    /// so the last host command stays in effect. Gives up when the session stops or
    /// the worker has gone away.
    pub(crate) fn with_quiesced<T>(&self, f: impl FnOnce() -> T) -> Quiesce<T> {
        let mut run = self.run.lock();
        let mut paused_here = false;
        loop {
            let current = *run;
            match current {
                RunState::Stopped => return Quiesce::Stopped,
                _ if self.really_paused.load(Ordering::Acquire) => {
                    let value = f();
                    if paused_here {
                        *run = RunState::Running;
                        self.cv.notify_all();
                    }
                    return Quiesce::Done(value);
                }
                _ if self.worker_exited.load(Ordering::Acquire) => {
                    return Quiesce::WorkerExited;
                }
                RunState::Running => {
                    *run = RunState::PauseRequested;
                    paused_here = true;
                }
                RunState::PauseRequested | RunState::Paused => {}
            }
            self.cv.wait(&mut run);
        }
    }
}

/// Counters and settings that outlive a single session.
pub(crate) struct RuntimeState {
    pub(crate) observed_fps: AtomicU32,
    pub(crate) frame_seq: AtomicU64,
    pub(crate) rate: Mutex<TargetRate>,
}

impl RuntimeState {
    pub(crate) fn new(rate: TargetRate) -> Self {
        Self {
            observed_fps: AtomicU32::new(0),
            frame_seq: AtomicU64::new(0),
            rate: Mutex::new(rate),
        }
    }

    /// Start-of-session defaults: fast-forward off, counters cleared.
    pub(crate) fn reset_session(&self) {
        self.rate.lock().fast_forward = false;
        self.observed_fps.store(0, Ordering::Relaxed);
        self.frame_seq.store(0, Ordering::Relaxed);
    }
}
