//! Worker health scoring.
//!
//! A deterministic composite of four subscores, each in [0, 1]:
//!
//! - **load** — `1 − current_load / max_load` (1 when `max_load` is 0)
//! - **success** — `successes / (successes + failures)` (1 with no samples)
//! - **latency** — `1 − avg_latency / max_latency_ms`, clamped, over
//!   samples inside `latency_window_ms`; 1 until `min_latency_samples`
//!   samples exist
//! - **availability** — accumulated uptime over tracked lifetime (1 when
//!   nothing has been tracked yet)
//!
//! The overall score is the weighted average of the four. Scores are
//! advisory: they rank workers, they never reject them — rejection is the
//! circuit breaker's job.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use taskfleet_common::epoch_ms;

/// Relative weight of each subscore in the composite.
#[derive(Debug, Clone)]
pub struct HealthWeights {
    pub load: f64,
    pub success: f64,
    pub latency: f64,
    pub availability: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            load: 0.30,
            success: 0.35,
            latency: 0.20,
            availability: 0.15,
        }
    }
}

impl HealthWeights {
    fn sum(&self) -> f64 {
        self.load + self.success + self.latency + self.availability
    }
}

/// Scoring parameters.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub weights: HealthWeights,
    /// Latency at or above which the latency subscore reaches 0.
    pub max_latency_ms: f64,
    /// Only latency samples newer than this take part in the average.
    pub latency_window_ms: u64,
    /// Below this many windowed samples the latency subscore is 1.
    pub min_latency_samples: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            weights: HealthWeights::default(),
            max_latency_ms: 10_000.0,
            latency_window_ms: 300_000,
            min_latency_samples: 5,
        }
    }
}

/// Point-in-time composite score for one worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScore {
    pub load: f64,
    pub success: f64,
    pub latency: f64,
    pub availability: f64,
    pub overall: f64,
}

/// Accumulating per-worker sample state.
///
/// Trackers are born "up"; `mark_down`/`mark_up` bracket offline spans so
/// the availability subscore reflects them.
#[derive(Debug)]
pub struct WorkerHealthTracker {
    successes: u64,
    failures: u64,
    /// (timestamp_ms, latency_ms), oldest first.
    latency_samples: VecDeque<(u64, f64)>,
    started_at_ms: u64,
    up_since_ms: Option<u64>,
    accumulated_uptime_ms: u64,
}

impl WorkerHealthTracker {
    pub fn new() -> Self {
        let now = epoch_ms();
        Self {
            successes: 0,
            failures: 0,
            latency_samples: VecDeque::new(),
            started_at_ms: now,
            up_since_ms: Some(now),
            accumulated_uptime_ms: 0,
        }
    }

    pub fn record_success(&mut self, latency_ms: f64) {
        let now = epoch_ms();
        self.successes += 1;
        self.latency_samples.push_back((now, latency_ms));
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn mark_up(&mut self) {
        if self.up_since_ms.is_none() {
            self.up_since_ms = Some(epoch_ms());
        }
    }

    pub fn mark_down(&mut self) {
        if let Some(since) = self.up_since_ms.take() {
            self.accumulated_uptime_ms += epoch_ms().saturating_sub(since);
        }
    }

    fn uptime_ms(&self, now: u64) -> u64 {
        let live = self
            .up_since_ms
            .map(|since| now.saturating_sub(since))
            .unwrap_or(0);
        self.accumulated_uptime_ms + live
    }

    fn success_score(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    fn latency_score(&self, config: &HealthConfig, now: u64) -> f64 {
        let cutoff = now.saturating_sub(config.latency_window_ms);
        let windowed: Vec<f64> = self
            .latency_samples
            .iter()
            .filter(|(t, _)| *t >= cutoff)
            .map(|(_, l)| *l)
            .collect();
        if windowed.len() < config.min_latency_samples {
            return 1.0;
        }
        let avg = windowed.iter().sum::<f64>() / windowed.len() as f64;
        (1.0 - avg / config.max_latency_ms).clamp(0.0, 1.0)
    }

    fn availability_score(&self, now: u64) -> f64 {
        let total = now.saturating_sub(self.started_at_ms);
        if total == 0 {
            1.0
        } else {
            (self.uptime_ms(now) as f64 / total as f64).clamp(0.0, 1.0)
        }
    }

    /// Composite score given the worker's current load picture.
    pub fn score(&self, config: &HealthConfig, current_load: u32, max_load: u32) -> HealthScore {
        let now = epoch_ms();
        let load = if max_load == 0 {
            1.0
        } else {
            (1.0 - current_load as f64 / max_load as f64).clamp(0.0, 1.0)
        };
        let success = self.success_score();
        let latency = self.latency_score(config, now);
        let availability = self.availability_score(now);

        let w = &config.weights;
        let sum = w.sum();
        let overall = if sum <= 0.0 {
            0.0
        } else {
            (load * w.load + success * w.success + latency * w.latency + availability * w.availability)
                / sum
        };

        HealthScore {
            load,
            success,
            latency,
            availability,
            overall,
        }
    }
}

impl Default for WorkerHealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracker per worker id, created lazily on first touch.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    config: HealthConfig,
    trackers: HashMap<String, WorkerHealthTracker>,
}

impl HealthRegistry {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
        }
    }

    fn tracker(&mut self, worker_id: &str) -> &mut WorkerHealthTracker {
        self.trackers
            .entry(worker_id.to_string())
            .or_default()
    }

    pub fn record_success(&mut self, worker_id: &str, latency_ms: f64) {
        self.tracker(worker_id).record_success(latency_ms);
    }

    pub fn record_failure(&mut self, worker_id: &str) {
        self.tracker(worker_id).record_failure();
    }

    pub fn mark_up(&mut self, worker_id: &str) {
        self.tracker(worker_id).mark_up();
    }

    pub fn mark_down(&mut self, worker_id: &str) {
        self.tracker(worker_id).mark_down();
    }

    pub fn score(&mut self, worker_id: &str, current_load: u32, max_load: u32) -> HealthScore {
        let config = self.config.clone();
        self.tracker(worker_id).score(&config, current_load, max_load)
    }

    /// Argmax of the current composite score over `candidates`, each given
    /// as `(worker_id, current_load, max_load)`. The first candidate wins
    /// ties; `None` for an empty slice.
    pub fn healthiest(&mut self, candidates: &[(&str, u32, u32)]) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for &(id, current, max) in candidates {
            let score = self.score(id, current, max).overall;
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((id, score)),
            }
        }
        best.map(|(id, _)| id.to_string())
    }

    /// Drop a worker's tracker entirely (on unregister).
    pub fn remove(&mut self, worker_id: &str) {
        self.trackers.remove(worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_tracker_scores_perfect() {
        let tracker = WorkerHealthTracker::new();
        let score = tracker.score(&HealthConfig::default(), 0, 4);
        assert_eq!(score.load, 1.0);
        assert_eq!(score.success, 1.0);
        assert_eq!(score.latency, 1.0);
        assert!(score.availability >= 0.99);
        assert!(score.overall >= 0.99);
    }

    #[test]
    fn test_load_subscore() {
        let tracker = WorkerHealthTracker::new();
        let config = HealthConfig::default();
        assert_eq!(tracker.score(&config, 2, 4).load, 0.5);
        assert_eq!(tracker.score(&config, 4, 4).load, 0.0);
        // max_load of zero scores as unloaded.
        assert_eq!(tracker.score(&config, 3, 0).load, 1.0);
    }

    #[test]
    fn test_success_subscore() {
        let mut tracker = WorkerHealthTracker::new();
        let config = HealthConfig::default();
        tracker.record_success(10.0);
        tracker.record_success(10.0);
        tracker.record_success(10.0);
        tracker.record_failure();
        assert_eq!(tracker.score(&config, 0, 1).success, 0.75);
    }

    #[test]
    fn test_latency_needs_minimum_samples() {
        let mut tracker = WorkerHealthTracker::new();
        let config = HealthConfig {
            min_latency_samples: 3,
            max_latency_ms: 1_000.0,
            ..Default::default()
        };
        tracker.record_success(900.0);
        tracker.record_success(900.0);
        // Two samples, minimum three.
        assert_eq!(tracker.score(&config, 0, 1).latency, 1.0);

        tracker.record_success(900.0);
        let latency = tracker.score(&config, 0, 1).latency;
        assert!((latency - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_latency_clamps_to_zero() {
        let mut tracker = WorkerHealthTracker::new();
        let config = HealthConfig {
            min_latency_samples: 1,
            max_latency_ms: 100.0,
            ..Default::default()
        };
        tracker.record_success(500.0);
        assert_eq!(tracker.score(&config, 0, 1).latency, 0.0);
    }

    #[test]
    fn test_availability_after_downtime() {
        let mut tracker = WorkerHealthTracker::new();
        let config = HealthConfig::default();
        tracker.mark_down();
        std::thread::sleep(std::time::Duration::from_millis(30));
        let availability = tracker.score(&config, 0, 1).availability;
        // Most of the tracked lifetime was spent down.
        assert!(availability < 0.5, "availability {}", availability);

        tracker.mark_up();
        std::thread::sleep(std::time::Duration::from_millis(30));
        let recovered = tracker.score(&config, 0, 1).availability;
        assert!(recovered > availability);
    }

    #[test]
    fn test_mark_up_is_idempotent() {
        let mut tracker = WorkerHealthTracker::new();
        tracker.mark_up();
        tracker.mark_up();
        tracker.mark_down();
        // Double mark_down must not double-count.
        tracker.mark_down();
        let config = HealthConfig::default();
        let score = tracker.score(&config, 0, 1);
        assert!(score.availability <= 1.0);
    }

    #[test]
    fn test_weighted_composite() {
        let mut tracker = WorkerHealthTracker::new();
        let config = HealthConfig {
            weights: HealthWeights {
                load: 1.0,
                success: 1.0,
                latency: 0.0,
                availability: 0.0,
            },
            ..Default::default()
        };
        tracker.record_failure();
        // load = 0.5, success = 0.0, equal weights over the two.
        let score = tracker.score(&config, 2, 4);
        assert!((score.overall - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_registry_healthiest_prefers_unloaded() {
        let mut reg = HealthRegistry::new(HealthConfig::default());
        // Same sample history, different load pictures.
        let best = reg.healthiest(&[("w1", 4, 4), ("w2", 0, 4), ("w3", 2, 4)]);
        assert_eq!(best, Some("w2".to_string()));
    }

    #[test]
    fn test_registry_healthiest_penalizes_failures() {
        let mut reg = HealthRegistry::new(HealthConfig::default());
        for _ in 0..10 {
            reg.record_failure("w1");
            reg.record_success("w2", 10.0);
        }
        let best = reg.healthiest(&[("w1", 0, 4), ("w2", 0, 4)]);
        assert_eq!(best, Some("w2".to_string()));
    }

    #[test]
    fn test_registry_healthiest_empty_and_ties() {
        let mut reg = HealthRegistry::new(HealthConfig::default());
        assert_eq!(reg.healthiest(&[]), None);
        // Identical candidates: first wins.
        let best = reg.healthiest(&[("w1", 1, 4), ("w2", 1, 4)]);
        assert_eq!(best, Some("w1".to_string()));
    }

    #[test]
    fn test_registry_remove() {
        let mut reg = HealthRegistry::new(HealthConfig::default());
        for _ in 0..5 {
            reg.record_failure("w1");
        }
        reg.remove("w1");
        // A fresh tracker scores clean again.
        assert_eq!(reg.score("w1", 0, 1).success, 1.0);
    }
}
