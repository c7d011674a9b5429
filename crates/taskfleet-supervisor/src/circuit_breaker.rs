//! Per-worker circuit breaker.
//!
//! Failure isolation for routing decisions: a breaker per worker tracks
//! outcomes over a sliding time window and trips open when the windowed
//! failure rate crosses a threshold. Open circuits reject execution until a
//! cooldown elapses, then probe recovery through a half-open state.
//!
//! State transitions:
//!
//! - **closed → open**: on a recorded failure, when the window holds at
//!   least `minimum_requests` samples and the failure rate is at or above
//!   `failure_threshold`.
//! - **open → half_open**: evaluated inside [`CircuitBreaker::can_execute`]
//!   once `cooldown_ms` has elapsed since the last failure; the
//!   transitioning call itself is admitted.
//! - **half_open → closed**: after `success_threshold` recorded successes;
//!   closing clears the sample window.
//! - **half_open → open**: on any recorded failure.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use taskfleet_common::epoch_ms;

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Windowed failure rate in (0, 1] that trips the circuit.
    pub failure_threshold: f64,
    /// Minimum windowed samples before the rate is meaningful.
    pub minimum_requests: usize,
    /// Sliding window length; older samples are pruned before evaluation.
    pub window_ms: u64,
    /// Time after the last failure before an open circuit probes recovery.
    pub cooldown_ms: u64,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            minimum_requests: 5,
            window_ms: 60_000,
            cooldown_ms: 30_000,
            success_threshold: 2,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of one breaker, for the stats surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub windowed_requests: usize,
    pub windowed_failures: usize,
    pub failure_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_ms: Option<u64>,
}

/// Failure isolator for a single worker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    /// (timestamp_ms, success) samples, oldest first.
    samples: VecDeque<(u64, bool)>,
    last_failure_ms: Option<u64>,
    half_open_successes: u32,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            samples: VecDeque::new(),
            last_failure_ms: None,
            half_open_successes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may proceed right now.
    ///
    /// For an open circuit this evaluates the cooldown: once
    /// `cooldown_ms` has passed since the last failure the breaker moves
    /// to half_open and admits this call.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = epoch_ms();
                let cooled = self
                    .last_failure_ms
                    .map(|t| now.saturating_sub(t) >= self.config.cooldown_ms)
                    .unwrap_or(true);
                if cooled {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        let now = epoch_ms();
        self.samples.push_back((now, true));
        self.prune(now);

        if self.state == CircuitState::HalfOpen {
            self.half_open_successes += 1;
            if self.half_open_successes >= self.config.success_threshold {
                self.state = CircuitState::Closed;
                self.samples.clear();
                self.half_open_successes = 0;
            }
        }
    }

    pub fn record_failure(&mut self) {
        let now = epoch_ms();
        self.samples.push_back((now, false));
        self.prune(now);
        self.last_failure_ms = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                if self.samples.len() >= self.config.minimum_requests
                    && self.failure_rate() >= self.config.failure_threshold
                {
                    self.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Windowed failure rate; 0 with no samples.
    pub fn failure_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failures = self.samples.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.samples.len() as f64
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state,
            windowed_requests: self.samples.len(),
            windowed_failures: self.samples.iter().filter(|(_, ok)| !ok).count(),
            failure_rate: self.failure_rate(),
            last_failure_ms: self.last_failure_ms,
        }
    }

    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.config.window_ms);
        while let Some(&(t, _)) = self.samples.front() {
            if t < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.samples.clear();
        self.last_failure_ms = None;
        self.half_open_successes = 0;
    }
}

/// Breaker per worker id, created lazily on first touch.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: HashMap<String, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: HashMap::new(),
        }
    }

    fn breaker(&mut self, worker_id: &str) -> &mut CircuitBreaker {
        self.breakers
            .entry(worker_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.config.clone()))
    }

    /// Shorthand for `can_execute` on the worker's breaker.
    pub fn is_available(&mut self, worker_id: &str) -> bool {
        self.breaker(worker_id).can_execute()
    }

    pub fn record_success(&mut self, worker_id: &str) {
        self.breaker(worker_id).record_success();
    }

    pub fn record_failure(&mut self, worker_id: &str) {
        self.breaker(worker_id).record_failure();
    }

    pub fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|(id, b)| (id.clone(), b.stats()))
            .collect()
    }

    /// Worker ids whose circuit is currently open (cooldown not consulted).
    pub fn get_open_circuits(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|(_, b)| b.state() == CircuitState::Open)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn reset(&mut self, worker_id: &str) {
        if let Some(b) = self.breakers.get_mut(worker_id) {
            b.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for b in self.breakers.values_mut() {
            b.reset();
        }
    }

    /// Drop a worker's breaker entirely (on unregister).
    pub fn remove(&mut self, worker_id: &str) {
        self.breakers.remove(worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 0.5,
            minimum_requests: 4,
            window_ms: 10_000,
            cooldown_ms: 50,
            success_threshold: 2,
        }
    }

    #[test]
    fn test_starts_closed_and_admits() {
        let mut b = CircuitBreaker::new(fast_config());
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.can_execute());
    }

    #[test]
    fn test_stays_closed_below_minimum_requests() {
        let mut b = CircuitBreaker::new(fast_config());
        b.record_failure();
        b.record_failure();
        b.record_failure();
        // Only 3 samples, minimum is 4.
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut b = CircuitBreaker::new(fast_config());
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.can_execute());
    }

    #[test]
    fn test_stays_closed_below_failure_rate() {
        let mut b = CircuitBreaker::new(fast_config());
        // 2 failures out of 6 = 0.33 < 0.5.
        for _ in 0..4 {
            b.record_success();
        }
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_then_closes() {
        let mut b = CircuitBreaker::new(fast_config());
        for _ in 0..4 {
            b.record_failure();
        }
        assert!(!b.can_execute());

        std::thread::sleep(Duration::from_millis(60));
        assert!(b.can_execute());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        // Closing cleared the window.
        assert_eq!(b.stats().windowed_requests, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut b = CircuitBreaker::new(fast_config());
        for _ in 0..4 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(b.can_execute());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        // Fresh failure restarts the cooldown.
        assert!(!b.can_execute());
    }

    #[test]
    fn test_window_prunes_old_samples() {
        let mut b = CircuitBreaker::new(CircuitBreakerConfig {
            window_ms: 30,
            ..fast_config()
        });
        b.record_failure();
        b.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        // The new sample triggers pruning of the two stale failures.
        b.record_success();
        let stats = b.stats();
        assert_eq!(stats.windowed_requests, 1);
        assert_eq!(stats.windowed_failures, 0);
    }

    #[test]
    fn test_failure_rate() {
        let mut b = CircuitBreaker::new(fast_config());
        assert_eq!(b.failure_rate(), 0.0);
        b.record_success();
        b.record_failure();
        assert_eq!(b.failure_rate(), 0.5);
    }

    #[test]
    fn test_registry_lazy_creation_and_stats() {
        let mut reg = CircuitBreakerRegistry::new(fast_config());
        assert!(reg.is_available("w1"));
        reg.record_failure("w2");
        let stats = reg.get_all_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["w2"].windowed_failures, 1);
    }

    #[test]
    fn test_registry_open_circuits_and_reset() {
        let mut reg = CircuitBreakerRegistry::new(fast_config());
        for _ in 0..4 {
            reg.record_failure("w1");
        }
        reg.record_success("w2");
        assert_eq!(reg.get_open_circuits(), vec!["w1".to_string()]);

        reg.reset("w1");
        assert!(reg.get_open_circuits().is_empty());
        assert!(reg.is_available("w1"));
    }

    #[test]
    fn test_registry_reset_all_and_remove() {
        let mut reg = CircuitBreakerRegistry::new(fast_config());
        for id in ["w1", "w2"] {
            for _ in 0..4 {
                reg.record_failure(id);
            }
        }
        assert_eq!(reg.get_open_circuits().len(), 2);
        reg.reset_all();
        assert!(reg.get_open_circuits().is_empty());

        reg.remove("w1");
        assert_eq!(reg.get_all_stats().len(), 1);
    }
}
