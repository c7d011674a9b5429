//! Lifecycle event observers.
//!
//! A typed observer interface with default no-op methods, wired into the
//! supervisor before it starts. Observers run synchronously on the calling
//! task; a panicking observer is logged and swallowed so it can never
//! corrupt core state. Handlers are expected to be non-blocking — a slow
//! observer degrades assignment latency.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use taskfleet_common::{Task, TaskResult, Worker};
use tracing::warn;

/// Supervisor lifecycle notifications. Implement only what you need.
pub trait SupervisorEvents: Send + Sync {
    fn on_task_assigned(&self, _task: &Task, _worker_id: &str) {}
    fn on_task_completed(&self, _result: &TaskResult) {}
    fn on_task_failed(&self, _task: &Task, _error: &str) {}
    fn on_worker_online(&self, _worker: &Worker) {}
    fn on_worker_offline(&self, _worker: &Worker) {}
}

/// Invoke `f` on every observer, isolating panics.
pub(crate) fn dispatch(observers: &[Arc<dyn SupervisorEvents>], f: impl Fn(&dyn SupervisorEvents)) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
            warn!("event observer panicked; continuing");
        }
    }
}
