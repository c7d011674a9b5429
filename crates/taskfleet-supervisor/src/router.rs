//! Task routing.
//!
//! A pure decision layer: given a task and the registry, pick a worker or
//! report no fit. Eligibility is computed in two steps — available workers
//! (online or busy, with headroom) admitted by the caller's gate, then a
//! capability filter that falls back to the whole admitted pool when no
//! worker matches the task's type. The breaker gate is injected by the
//! caller; the router itself never consults breaker state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use taskfleet_common::{Task, Worker};

use crate::registry::WorkerRegistry;

/// Worker selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    RoundRobin,
    #[default]
    LeastLoaded,
    CapabilityMatch,
    Random,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingStrategy::RoundRobin => "round-robin",
            RoutingStrategy::LeastLoaded => "least-loaded",
            RoutingStrategy::CapabilityMatch => "capability-match",
            RoutingStrategy::Random => "random",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(RoutingStrategy::RoundRobin),
            "least-loaded" => Ok(RoutingStrategy::LeastLoaded),
            "capability-match" => Ok(RoutingStrategy::CapabilityMatch),
            "random" => Ok(RoutingStrategy::Random),
            other => Err(format!(
                "unknown routing strategy '{}' (expected round-robin, least-loaded, capability-match or random)",
                other
            )),
        }
    }
}

/// Stateful router: the only state is the round-robin cursor.
#[derive(Debug)]
pub struct TaskRouter {
    strategy: RoutingStrategy,
    round_robin_index: usize,
}

impl TaskRouter {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            round_robin_index: 0,
        }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// Pick a worker for `task`, or `None` when no admitted worker is
    /// available.
    ///
    /// `admit` is applied to the available pool before capability
    /// filtering — this is where callers enforce circuit-breaker state.
    pub fn select(
        &mut self,
        task: &Task,
        registry: &WorkerRegistry,
        mut admit: impl FnMut(&str) -> bool,
    ) -> Option<String> {
        let pool: Vec<Worker> = registry
            .get_available()
            .into_iter()
            .filter(|w| admit(&w.id))
            .collect();
        if pool.is_empty() {
            return None;
        }

        // Capability filter with fallback: a task nobody matches is
        // accepted by any available worker.
        let eligible: Vec<&Worker> = {
            let matched: Vec<&Worker> = pool.iter().filter(|w| w.accepts(&task.task_type)).collect();
            if matched.is_empty() {
                pool.iter().collect()
            } else {
                matched
            }
        };

        let chosen = match self.strategy {
            RoutingStrategy::RoundRobin => {
                let idx = self.round_robin_index % eligible.len();
                self.round_robin_index = self.round_robin_index.wrapping_add(1) % eligible.len();
                eligible[idx]
            }
            RoutingStrategy::LeastLoaded => least_loaded(&eligible),
            RoutingStrategy::CapabilityMatch => {
                let explicit: Vec<&Worker> = eligible
                    .iter()
                    .filter(|w| w.capabilities.iter().any(|c| c == &task.task_type))
                    .copied()
                    .collect();
                if explicit.is_empty() {
                    least_loaded(&eligible)
                } else {
                    least_loaded(&explicit)
                }
            }
            RoutingStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..eligible.len());
                eligible[idx]
            }
        };

        Some(chosen.id.clone())
    }
}

/// Argmin of load ratio; the strictly-less comparison keeps the first-seen
/// worker on ties.
fn least_loaded<'a>(workers: &[&'a Worker]) -> &'a Worker {
    let mut best = workers[0];
    for w in &workers[1..] {
        if w.load_ratio() < best.load_ratio() {
            best = w;
        }
    }
    best
}
