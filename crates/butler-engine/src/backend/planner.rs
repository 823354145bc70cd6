//! Resilient planner client with a one-shot fallback on timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Planner, PLANNER};
use crate::error::DependencyError;
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::types::{PlannerReply, ToolSpec, Turn};

/// Wraps the primary planner (and optionally a smaller, faster fallback)
/// behind the planner breaker, retry policy and call timeout.
pub struct PlannerClient {
    primary: Arc<dyn Planner>,
    fallback: Option<Arc<dyn Planner>>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl PlannerClient {
    pub fn new(
        primary: Arc<dyn Planner>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback: None,
            breaker,
            retry,
            timeout,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Planner>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Ask for the next actions.
    ///
    /// Transient failures are retried; a timeout is not retried against the
    /// same planner but switches to the fallback, once.
    pub async fn plan(&self, conversation: &[Turn], tools: &[ToolSpec]) -> Result<PlannerReply, DependencyError> {
        match self.call(self.primary.as_ref(), conversation, tools).await {
            Err(err) if err.is_timeout() => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        primary = %self.primary.name(),
                        fallback = %fallback.name(),
                        error = %err,
                        "Planner timed out, retrying with fallback"
                    );
                    self.call(fallback.as_ref(), conversation, tools).await
                }
                None => Err(err),
            },
            other => other,
        }
    }

    async fn call(
        &self,
        planner: &dyn Planner,
        conversation: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<PlannerReply, DependencyError> {
        let timeout = self.timeout;
        self.retry
            .run_classified(
                &self.breaker,
                |e| e.is_retryable() && !e.is_timeout(),
                move || async move {
                    match tokio::time::timeout(timeout, planner.plan(conversation, tools)).await {
                        Ok(result) => result,
                        Err(_) => Err(DependencyError::Timeout {
                            dependency: PLANNER.to_string(),
                            elapsed: timeout,
                        }),
                    }
                },
            )
            .await
    }
}
