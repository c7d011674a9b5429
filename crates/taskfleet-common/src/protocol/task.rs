//! Task model: submissions, lifecycle state, and results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority. Lower rank is served first; within a rank the
/// queue is FIFO on submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    /// Numeric rank used for queue ordering: critical < high < normal < low.
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
        }
    }
}

/// Task lifecycle status.
///
/// `timeout` never appears on a stored task: a timed-out task is reported
/// as a synthetic failure and lands in `failed` (or back in `pending` when
/// retries remain). The variant exists so results can tag the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// A client submission. Omitted `priority`, `timeout_ms` and `max_retries`
/// are filled from supervisor configuration at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// A task as tracked by the supervisor.
///
/// At any instant a task lives in exactly one of the pending queue, the
/// active table, or (as its final result) the results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-minted UUID.
    pub id: String,
    /// Work type; matched against worker capability sets.
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: serde_json::Value,
    pub priority: TaskPriority,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub status: TaskStatus,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
}

impl Task {
    /// Clear assignment fields and return the task to `pending`, counting
    /// one retry. Used when a failure is retriable.
    pub fn reset_for_retry(&mut self) {
        self.retries += 1;
        self.assigned_to = None;
        self.assigned_at_ms = None;
        self.status = TaskStatus::Pending;
    }
}

/// Immutable record of a task execution outcome, as reported by a worker
/// (or synthesized by the timeout sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub worker_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}
