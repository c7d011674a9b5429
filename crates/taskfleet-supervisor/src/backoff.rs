//! Exponential backoff with jitter.
//!
//! The delay for attempt `n` (0-indexed) is
//! `min(max_delay_ms, base_delay_ms * 2^n)`, spread by a jitter factor so
//! that a burst of retries does not land on the same instant. Offered as a
//! pure calculation, a stateful iterator, and an async retry helper.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay for attempt 0.
    pub base_delay_ms: u64,
    /// Cap applied before jitter.
    pub max_delay_ms: u64,
    /// Jitter factor in [0, 1]; the delay is scaled by `1 + u * jitter`
    /// with `u` uniform in (-1, 1). Zero disables jitter.
    pub jitter: f64,
    /// Number of delays the iterator will hand out before reporting
    /// exhaustion.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: 0.1,
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Pure delay calculation for a 0-indexed attempt.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let exp = 2u64.saturating_pow(attempt);
        let capped = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || capped == 0 {
            return capped;
        }
        let u: f64 = rand::thread_rng().gen_range(-1.0..1.0);
        (capped as f64 * (1.0 + u * jitter)).round().max(0.0) as u64
    }
}

/// Stateful backoff iterator.
///
/// `next()` returns the delay for the current attempt and advances, or
/// `None` once `max_attempts` delays have been handed out. `reset()`
/// rewinds to attempt 0.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the current attempt, advancing the counter; `None` when
    /// attempts are exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u64> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.calculate_delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Retries `op` with exponential backoff until it succeeds, fails with a
/// non-retriable error (as judged by `is_retriable`), or attempts are
/// exhausted. `on_retry(attempt, delay_ms, error)` is invoked before each
/// sleep. Exhaustion returns the last error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: BackoffConfig,
    mut op: F,
    is_retriable: impl Fn(&E) -> bool,
    mut on_retry: impl FnMut(u32, u64, &E),
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = ExponentialBackoff::new(config);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) {
                    return Err(err);
                }
                match backoff.next() {
                    Some(delay_ms) => {
                        on_retry(backoff.attempt(), delay_ms, &err);
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    None => return Err(err),
                }
            }
        }
    }
}
