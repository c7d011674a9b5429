//! Worker model and worker-facing payloads.
//!
//! A worker is a remote process that executes tasks. The supervisor only
//! ever sees it through two payloads: a registration (the descriptor) and
//! periodic heartbeats (the dynamic fields). Liveness is derived from
//! heartbeat age, never from probing the worker's endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registered worker.
///
/// `online` and `busy` workers are candidates for assignment as long as
/// they have load headroom; `degraded` and `offline` workers are not.
/// `offline` is set by the liveness sweep when heartbeats go silent; the
/// record stays in the registry for observability until unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Busy,
    Degraded,
    Offline,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Degraded => "degraded",
            WorkerStatus::Offline => "offline",
        };
        write!(f, "{}", s)
    }
}

/// A registered worker as tracked by the supervisor.
///
/// Descriptor fields (`name`, `endpoint`, `capabilities`, `max_load`,
/// `metadata`) come from registration and may be refreshed by re-register
/// or heartbeat; dynamic fields (`status`, `current_load`,
/// `last_heartbeat_ms`) are owned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Client-chosen opaque identifier, unique within the registry.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// URL the worker receives dispatches on (opaque to the supervisor).
    pub endpoint: String,
    /// Capability tags matched against task types. Empty means the worker
    /// accepts any task type.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Maximum concurrent tasks the worker will take.
    pub max_load: u32,
    /// Opaque key/value descriptor supplied at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub status: WorkerStatus,
    pub current_load: u32,
    /// Epoch millis of the most recent heartbeat (or registration).
    pub last_heartbeat_ms: u64,
    /// Epoch millis of first registration.
    pub registered_at_ms: u64,
}

impl Worker {
    /// True when the worker could take one more task right now.
    pub fn has_headroom(&self) -> bool {
        self.current_load < self.max_load
    }

    /// True when the worker's capability set covers `task_type`, either
    /// explicitly or via the empty-set wildcard.
    pub fn accepts(&self, task_type: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.iter().any(|c| c == task_type)
    }

    /// Load as a fraction of capacity, used by least-loaded routing.
    /// A worker with `max_load == 0` is treated as fully loaded.
    pub fn load_ratio(&self) -> f64 {
        if self.max_load == 0 {
            1.0
        } else {
            self.current_load as f64 / self.max_load as f64
        }
    }
}

/// Registration payload posted by a worker (or on its behalf).
///
/// `id`, `name` and `endpoint` are required at the HTTP boundary;
/// `max_load` defaults to 10 when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRegistration {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub current_load: u32,
    #[serde(default = "default_max_load")]
    pub max_load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_max_load() -> u32 {
    10
}

/// Heartbeat payload.
///
/// Carries the worker's self-advertised dynamic state. A missing
/// `capabilities` field leaves the advertised set unchanged; a present one
/// replaces it, so workers may update their capabilities on any beat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub current_load: u32,
    pub max_load: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
}
