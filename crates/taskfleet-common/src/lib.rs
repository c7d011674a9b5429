//! Taskfleet Common
//!
//! Shared types for the Taskfleet supervisor: the wire/domain model
//! (workers, tasks, results, heartbeats) and the error taxonomy used across
//! the control plane.
//!
//! Everything here serializes to the camelCase JSON contract spoken by the
//! HTTP control plane; the supervisor core and the CLI both build on these
//! types.

pub mod error;
pub mod protocol;

pub use error::{FleetError, Result};
pub use protocol::task::{Task, TaskPriority, TaskResult, TaskStatus, TaskSubmission};
pub use protocol::worker::{Heartbeat, Worker, WorkerRegistration, WorkerStatus};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
///
/// Timestamps in the data model are only ever compared as differences
/// against "now", so wall-clock millis are sufficient.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
