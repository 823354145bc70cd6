//! Bounded retry with exponential backoff, gated by a circuit breaker.

use std::future::Future;
use std::time::Duration;

use butler_core::config::RetryConfig;

use crate::error::DependencyError;
use crate::resilience::breaker::CircuitBreaker;

/// Longest single backoff, whatever the configured base.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry policy for idempotent dependency calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base_secs: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base_secs: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base_secs,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base_secs)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (1-based): `base ^ attempt` seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base_secs.powi(attempt as i32);
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs).min(MAX_BACKOFF)
    }

    /// Run `op` with the default transient/terminal classification.
    pub async fn run<T, F, Fut>(&self, breaker: &CircuitBreaker, op: F) -> Result<T, DependencyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
    {
        self.run_classified(breaker, DependencyError::is_retryable, op)
            .await
    }

    /// Run `op`, retrying failures for which `should_retry` holds.
    ///
    /// Every attempt first asks the breaker for admission and reports its
    /// outcome back. Transient failures count against the breaker; a
    /// terminal rejection still proves the dependency is answering. If the
    /// returned future is dropped mid-attempt, the attempt's permit is
    /// released without an outcome.
    pub async fn run_classified<T, F, Fut, C>(
        &self,
        breaker: &CircuitBreaker,
        should_retry: C,
        mut op: F,
    ) -> Result<T, DependencyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DependencyError>>,
        C: Fn(&DependencyError) -> bool,
    {
        let mut attempt = 1;
        loop {
            let Some(permit) = breaker.try_acquire() else {
                tracing::debug!(dependency = %breaker.name(), attempt, "Call short-circuited");
                return Err(DependencyError::CircuitOpen(breaker.name().to_string()));
            };

            match op().await {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(err) => {
                    if err.is_retryable() {
                        permit.failure();
                    } else {
                        permit.success();
                    }

                    if !should_retry(&err) || attempt >= self.max_attempts {
                        tracing::debug!(
                            dependency = %breaker.name(),
                            attempt,
                            error = %err,
                            "Giving up"
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        dependency = %breaker.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
