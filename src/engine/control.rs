use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Default)]
struct ControlState {
    cancelled: bool,
    paused: bool,
    finished: bool,
}

/// Shared cancellation/pause token for one run.
///
/// Drivers call [`checkpoint`](Self::checkpoint) at item boundaries only;
/// a destructive action that has started always runs to completion.
#[derive(Debug, Default)]
pub struct ExecutionController {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl ExecutionController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) {
        self.lock().cancelled = true;
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn pause(&self) {
        self.lock().paused = true;
        self.changed.notify_all();
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Block while paused. Returns early if the run is cancelled.
    pub fn wait_if_paused(&self) {
        let guard = self.lock();
        let _guard = self
            .changed
            .wait_while(guard, |s| s.paused && !s.cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Item-boundary checkpoint: waits out a pause, then reports whether
    /// work may continue.
    pub fn checkpoint(&self) -> bool {
        self.wait_if_paused();
        !self.is_cancelled()
    }

    /// Mark the run as over so pending deadline threads exit early
    pub(crate) fn finish(&self) {
        self.lock().finished = true;
        self.changed.notify_all();
    }

    /// Signal cancellation once `deadline` elapses, unless the run
    /// finishes or is cancelled first. In-flight driver code is not killed.
    pub fn cancel_after(self: &Arc<Self>, deadline: Duration) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        std::thread::spawn(move || {
            let guard = controller.lock();
            let (mut guard, timeout) = controller
                .changed
                .wait_timeout_while(guard, deadline, |s| !s.finished && !s.cancelled)
                .unwrap_or_else(PoisonError::into_inner);
            if timeout.timed_out() {
                tracing::warn!(?deadline, "run deadline reached, cancelling");
                guard.cancelled = true;
                drop(guard);
                controller.changed.notify_all();
            }
        })
    }
}
