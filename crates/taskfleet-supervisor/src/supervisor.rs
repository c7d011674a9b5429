//! The supervisor: task lifecycle and the periodic ticks.
//!
//! Owns the priority-ordered pending queue, the active-task table, the
//! results table, the router, and the worker/breaker/health registries.
//! Two background tickers drive it: the assignment tick (timeout sweep,
//! then routing of pending tasks) and the liveness tick (ages out silent
//! workers).
//!
//! # Locking
//!
//! Queue, active table, results table and the router cursor live behind a
//! single `RwLock` so every cross-collection transition (submit,
//! assignment, result, timeout) is atomic with respect to the others.
//! Where more than one lock is needed the order is always state →
//! registry → breakers → health; events are emitted after all locks are
//! released.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskfleet_common::{
    epoch_ms, FleetError, Heartbeat, Result, Task, TaskResult, TaskStatus, TaskSubmission, Worker,
    WorkerRegistration, WorkerStatus,
};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats};
use crate::events::{dispatch, SupervisorEvents};
use crate::health::{HealthConfig, HealthRegistry};
use crate::registry::{RegistryStats, WorkerRegistry};
use crate::router::{RoutingStrategy, TaskRouter};

/// Supervisor tuning. Submission-time defaults (`default_task_timeout_ms`,
/// `default_max_retries`) apply to submissions that omit them.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub routing_strategy: RoutingStrategy,
    pub heartbeat_interval_ms: u64,
    pub missed_heartbeats_threshold: u32,
    pub default_task_timeout_ms: u64,
    pub default_max_retries: u32,
    pub max_queue_size: usize,
    /// Cadence of the assignment tick (timeout sweep + routing pass).
    pub assignment_interval_ms: u64,
    pub breaker: CircuitBreakerConfig,
    pub health: HealthConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::default(),
            heartbeat_interval_ms: 30_000,
            missed_heartbeats_threshold: 3,
            default_task_timeout_ms: 60_000,
            default_max_retries: 2,
            max_queue_size: 1_000,
            assignment_interval_ms: 1_000,
            breaker: CircuitBreakerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Task-side counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Combined supervisor stats, as served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStats {
    pub workers: RegistryStats,
    pub tasks: TaskStats,
}

/// Queue, active and results tables plus the router cursor. One lock
/// guards all of it so tasks move between collections atomically.
struct TaskState {
    queue: VecDeque<Task>,
    active: HashMap<String, Task>,
    results: HashMap<String, TaskResult>,
    router: TaskRouter,
}

impl TaskState {
    /// Insert preserving priority order: walk from the head to the first
    /// entry with a strictly greater rank and insert before it, which
    /// keeps submission order within a priority level.
    fn insert_by_priority(&mut self, task: Task) {
        let rank = task.priority.rank();
        let pos = self
            .queue
            .iter()
            .position(|t| t.priority.rank() > rank)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, task);
    }
}

/// Everything the tickers need, cheaply cloneable into spawned tasks.
#[derive(Clone)]
struct Shared {
    config: Arc<SupervisorConfig>,
    registry: Arc<RwLock<WorkerRegistry>>,
    state: Arc<RwLock<TaskState>>,
    breakers: Arc<RwLock<CircuitBreakerRegistry>>,
    health: Arc<RwLock<HealthRegistry>>,
    observers: Arc<std::sync::RwLock<Vec<Arc<dyn SupervisorEvents>>>>,
}

impl Shared {
    fn emit(&self, f: impl Fn(&dyn SupervisorEvents)) {
        let observers = self.observers.read().expect("observer lock poisoned");
        dispatch(&observers, f);
    }

    /// One assignment tick: sweep deadlines, then route pending tasks.
    async fn assignment_tick(&self) {
        self.sweep_timeouts().await;
        self.assign_pending().await;
    }

    /// Fail every active task past its deadline by synthesizing a failed
    /// result and feeding it through the normal result path, so timeouts
    /// and worker-reported failures share one retry policy. A real result
    /// racing the sweep wins if it lands first — the loser finds the task
    /// gone from the active table and is dropped.
    async fn sweep_timeouts(&self) {
        let now = epoch_ms();
        let expired: Vec<TaskResult> = {
            let state = self.state.read().await;
            state
                .active
                .values()
                .filter_map(|task| {
                    let assigned_at = task.assigned_at_ms?;
                    let elapsed = now.saturating_sub(assigned_at);
                    if elapsed > task.timeout_ms {
                        Some(TaskResult {
                            task_id: task.id.clone(),
                            worker_id: task.assigned_to.clone().unwrap_or_default(),
                            success: false,
                            result: None,
                            error: Some("Task timed out".to_string()),
                            duration_ms: elapsed,
                        })
                    } else {
                        None
                    }
                })
                .collect()
        };

        for result in expired {
            warn!(task_id = %result.task_id, worker_id = %result.worker_id, "task exceeded its deadline");
            self.report_task_result(result).await;
        }
    }

    /// Route pending tasks in queue order, gating candidate workers on
    /// their circuit breaker.
    async fn assign_pending(&self) {
        let mut assignments: Vec<(Task, String)> = Vec::new();
        {
            let mut state = self.state.write().await;
            let mut registry = self.registry.write().await;
            let mut breakers = self.breakers.write().await;

            let now = epoch_ms();
            let pending_ids: Vec<String> = state.queue.iter().map(|t| t.id.clone()).collect();
            for id in pending_ids {
                let Some(pos) = state.queue.iter().position(|t| t.id == id) else {
                    continue;
                };
                let snapshot = state.queue[pos].clone();
                let selected = state
                    .router
                    .select(&snapshot, &registry, |worker_id| breakers.is_available(worker_id));
                let Some(worker_id) = selected else {
                    continue;
                };

                let mut task = state.queue.remove(pos).expect("queue position just found");
                task.status = TaskStatus::Assigned;
                task.assigned_to = Some(worker_id.clone());
                task.assigned_at_ms = Some(now);
                registry.bump_load(&worker_id);
                state.active.insert(task.id.clone(), task.clone());
                assignments.push((task, worker_id));
            }
        }

        for (task, worker_id) in assignments {
            debug!(task_id = %task.id, worker_id = %worker_id, "task assigned");
            self.emit(|o| o.on_task_assigned(&task, &worker_id));
        }
    }

    /// One liveness tick: flip silent workers offline.
    async fn liveness_tick(&self) {
        let lost = {
            let mut registry = self.registry.write().await;
            registry.check_worker_health(
                self.config.heartbeat_interval_ms,
                self.config.missed_heartbeats_threshold,
            )
        };
        if lost.is_empty() {
            return;
        }
        {
            let mut health = self.health.write().await;
            for worker in &lost {
                health.mark_down(&worker.id);
            }
        }
        for worker in lost {
            warn!(worker_id = %worker.id, "worker went offline (missed heartbeats)");
            self.emit(|o| o.on_worker_offline(&worker));
        }
    }

    /// Settle a reported result: complete, retry, or fail the task, and
    /// record the outcome into the worker's breaker and health tracker.
    async fn report_task_result(&self, result: TaskResult) {
        let mut state = self.state.write().await;
        let Some(mut task) = state.active.remove(&result.task_id) else {
            // Unknown, already settled, or lost the race with the sweep.
            warn!(task_id = %result.task_id, "dropping result for task not in the active table");
            return;
        };

        {
            let mut registry = self.registry.write().await;
            registry.release_load(task.assigned_to.as_deref().unwrap_or(&result.worker_id));
        }
        {
            let mut breakers = self.breakers.write().await;
            let mut health = self.health.write().await;
            if result.success {
                breakers.record_success(&result.worker_id);
                health.record_success(&result.worker_id, result.duration_ms as f64);
            } else {
                breakers.record_failure(&result.worker_id);
                health.record_failure(&result.worker_id);
            }
        }

        let now = epoch_ms();
        if result.success {
            task.status = TaskStatus::Completed;
            task.completed_at_ms = Some(now);
            task.result = result.result.clone();
            // The settled task is represented by its result from here on.
            state.results.insert(task.id, result.clone());
            drop(state);
            debug!(task_id = %result.task_id, "task completed");
            self.emit(|o| o.on_task_completed(&result));
        } else if task.retries < task.max_retries {
            task.reset_for_retry();
            debug!(task_id = %task.id, retries = task.retries, "task failed, re-queueing");
            state.insert_by_priority(task);
            // Retriable failures emit no external event.
        } else {
            task.status = TaskStatus::Failed;
            task.completed_at_ms = Some(now);
            task.error = result.error.clone();
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            state.results.insert(task.id.clone(), result);
            let failed = task.clone();
            drop(state);
            warn!(task_id = %failed.id, error = %error, "task failed terminally");
            self.emit(|o| o.on_task_failed(&failed, &error));
        }
    }
}

/// The supervisory control plane for a worker fleet.
///
/// Construct, register observers, `start()` the tickers, then drive it
/// from the HTTP surface (or directly). `stop()` halts the tickers
/// without draining the queue. All state is in-memory; a restart discards
/// queue and history.
pub struct Supervisor {
    shared: Shared,
    tickers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let shared = Shared {
            registry: Arc::new(RwLock::new(WorkerRegistry::new())),
            state: Arc::new(RwLock::new(TaskState {
                queue: VecDeque::new(),
                active: HashMap::new(),
                results: HashMap::new(),
                router: TaskRouter::new(config.routing_strategy),
            })),
            breakers: Arc::new(RwLock::new(CircuitBreakerRegistry::new(config.breaker.clone()))),
            health: Arc::new(RwLock::new(HealthRegistry::new(config.health.clone()))),
            observers: Arc::new(std::sync::RwLock::new(Vec::new())),
            config: Arc::new(config),
        };
        Self {
            shared,
            tickers: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Register a lifecycle observer. Intended to be called before
    /// `start()`; observers added later only see subsequent events.
    pub fn add_observer(&self, observer: Arc<dyn SupervisorEvents>) {
        self.shared
            .observers
            .write()
            .expect("observer lock poisoned")
            .push(observer);
    }

    /// Spawn the assignment and liveness tickers. Idempotent while
    /// running.
    pub fn start(&self) {
        let mut tickers = self.tickers.lock().expect("ticker lock poisoned");
        if !tickers.is_empty() {
            return;
        }

        let shared = self.shared.clone();
        let assignment = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(shared.config.assignment_interval_ms));
            loop {
                interval.tick().await;
                shared.assignment_tick().await;
            }
        });

        let shared = self.shared.clone();
        let liveness = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(shared.config.heartbeat_interval_ms));
            loop {
                interval.tick().await;
                shared.liveness_tick().await;
            }
        });

        tickers.push(assignment);
        tickers.push(liveness);
        info!(
            strategy = %self.shared.config.routing_strategy,
            assignment_interval_ms = self.shared.config.assignment_interval_ms,
            heartbeat_interval_ms = self.shared.config.heartbeat_interval_ms,
            "supervisor started"
        );
    }

    /// Abort the tickers. The queue is not drained; pending and active
    /// tasks simply stop progressing.
    pub fn stop(&self) {
        let mut tickers = self.tickers.lock().expect("ticker lock poisoned");
        for handle in tickers.drain(..) {
            handle.abort();
        }
        info!("supervisor stopped");
    }

    /// Accept a submission: validate, mint an id, apply defaults, enqueue
    /// by priority.
    pub async fn submit_task(&self, submission: TaskSubmission) -> Result<Task> {
        if submission.task_type.trim().is_empty() {
            return Err(FleetError::Validation("task type must not be empty".to_string()));
        }
        if submission.timeout_ms == Some(0) {
            return Err(FleetError::Validation("timeoutMs must be positive".to_string()));
        }

        let config = &self.shared.config;
        let mut state = self.shared.state.write().await;
        if state.queue.len() >= config.max_queue_size {
            return Err(FleetError::QueueFull(config.max_queue_size));
        }

        let task = Task {
            id: Uuid::new_v4().to_string(),
            task_type: submission.task_type,
            payload: submission.payload,
            priority: submission.priority.unwrap_or_default(),
            timeout_ms: submission.timeout_ms.unwrap_or(config.default_task_timeout_ms),
            max_retries: submission.max_retries.unwrap_or(config.default_max_retries),
            status: TaskStatus::Pending,
            retries: 0,
            assigned_to: None,
            assigned_at_ms: None,
            completed_at_ms: None,
            result: None,
            error: None,
            created_at_ms: epoch_ms(),
        };
        state.insert_by_priority(task.clone());
        debug!(task_id = %task.id, task_type = %task.task_type, priority = ?task.priority, "task queued");
        Ok(task)
    }

    /// Register (or refresh) a worker.
    pub async fn register_worker(&self, registration: WorkerRegistration) -> Result<Worker> {
        if registration.id.trim().is_empty() {
            return Err(FleetError::Validation("worker id must not be empty".to_string()));
        }
        if registration.name.trim().is_empty() {
            return Err(FleetError::Validation("worker name must not be empty".to_string()));
        }
        if registration.endpoint.trim().is_empty() {
            return Err(FleetError::Validation("worker endpoint must not be empty".to_string()));
        }

        let (worker, came_online) = {
            let mut registry = self.shared.registry.write().await;
            registry.register(registration)
        };
        if came_online {
            self.shared.health.write().await.mark_up(&worker.id);
            info!(worker_id = %worker.id, endpoint = %worker.endpoint, "worker online");
            self.shared.emit(|o| o.on_worker_online(&worker));
        }
        Ok(worker)
    }

    /// Remove a worker and its breaker/health state. Returns whether it
    /// was registered.
    pub async fn unregister_worker(&self, id: &str) -> bool {
        let existed = {
            let mut registry = self.shared.registry.write().await;
            registry.unregister(id)
        };
        if existed {
            self.shared.breakers.write().await.remove(id);
            self.shared.health.write().await.remove(id);
            info!(worker_id = %id, "worker unregistered");
        }
        existed
    }

    /// Apply a heartbeat; `NotFound` for unknown workers.
    pub async fn heartbeat(&self, hb: Heartbeat) -> Result<Worker> {
        let updated = {
            let mut registry = self.shared.registry.write().await;
            registry.heartbeat(&hb)
        };
        let Some((worker, came_online)) = updated else {
            return Err(FleetError::NotFound(format!("worker {}", hb.worker_id)));
        };
        if came_online {
            self.shared.health.write().await.mark_up(&worker.id);
            info!(worker_id = %worker.id, "worker back online");
            self.shared.emit(|o| o.on_worker_online(&worker));
        } else if worker.status == WorkerStatus::Offline {
            self.shared.health.write().await.mark_down(&worker.id);
        }
        Ok(worker)
    }

    /// Settle a worker-reported result. Results for tasks not in the
    /// active table are logged and dropped.
    pub async fn report_task_result(&self, result: TaskResult) -> Result<()> {
        self.shared.report_task_result(result).await;
        Ok(())
    }

    /// Look a task up in the active table, then the queue. Settled tasks
    /// are only visible through their result.
    pub async fn get_task(&self, id: &str) -> Option<Task> {
        let state = self.shared.state.read().await;
        state
            .active
            .get(id)
            .cloned()
            .or_else(|| state.queue.iter().find(|t| t.id == id).cloned())
    }

    pub async fn get_task_result(&self, id: &str) -> Option<TaskResult> {
        self.shared.state.read().await.results.get(id).cloned()
    }

    pub async fn get_worker(&self, id: &str) -> Option<Worker> {
        self.shared.registry.read().await.get(id)
    }

    pub async fn list_workers(&self) -> Vec<Worker> {
        self.shared.registry.read().await.get_all()
    }

    pub async fn stats(&self) -> SupervisorStats {
        let workers = self.shared.registry.read().await.stats();
        let state = self.shared.state.read().await;
        let completed = state.results.values().filter(|r| r.success).count();
        let failed = state.results.values().filter(|r| !r.success).count();
        SupervisorStats {
            workers,
            tasks: TaskStats {
                queued: state.queue.len(),
                active: state.active.len(),
                completed,
                failed,
            },
        }
    }

    /// Per-worker breaker snapshots, for observability.
    pub async fn breaker_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.shared.breakers.read().await.get_all_stats()
    }

    /// Run one assignment tick immediately. Exposed for tests and for
    /// embedders that drive the supervisor manually.
    pub async fn tick_now(&self) {
        self.shared.assignment_tick().await;
    }

    /// Run one liveness sweep immediately.
    pub async fn liveness_sweep_now(&self) {
        self.shared.liveness_tick().await;
    }
}
