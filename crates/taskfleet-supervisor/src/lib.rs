//! Taskfleet Supervisor
//!
//! The supervisory control plane for a horizontally-scaled worker fleet.
//! A single supervisor process accepts task submissions, tracks worker
//! membership and liveness through heartbeats, routes each task to a
//! suitable worker, and supervises the task lifecycle through assignment,
//! execution, retry, timeout and completion.
//!
//! # Architecture
//!
//! The core is four tightly-coupled subsystems plus a thin HTTP adapter:
//!
//! 1. **Worker registry** — the authoritative table of worker records;
//!    liveness is derived from heartbeat age by a periodic sweep.
//! 2. **Task queue and lifecycle** — a priority-ordered pending queue, an
//!    active-task table and a results table, driven by the assignment
//!    tick; timeouts are synthesized failures that share the retry policy
//!    with worker-reported failures.
//! 3. **Router** — a pluggable strategy (round-robin, least-loaded,
//!    capability-match, random) selecting an eligible worker per task.
//! 4. **Fault isolation** — a per-worker circuit breaker over a sliding
//!    failure window gates routing; a weighted health score ranks workers
//!    for advisory purposes; exponential backoff is available for callers
//!    that retry against workers.
//!
//! Everything is in-memory: a restart discards the queue and all history.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskfleet_supervisor::{Supervisor, SupervisorConfig, SupervisorServer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Arc::new(Supervisor::new(SupervisorConfig::default()));
//! supervisor.start();
//!
//! let server = SupervisorServer::new(supervisor.clone());
//! server.run("0.0.0.0:7070".parse()?).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod events;
pub mod health;
pub mod http_api;
pub mod http_server;
pub mod registry;
pub mod router;
pub mod supervisor;

pub use backoff::{retry_with_backoff, BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState,
};
pub use events::SupervisorEvents;
pub use health::{HealthConfig, HealthRegistry, HealthScore, HealthWeights, WorkerHealthTracker};
pub use http_server::SupervisorServer;
pub use registry::{RegistryStats, WorkerRegistry};
pub use router::{RoutingStrategy, TaskRouter};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorStats, TaskStats};
