//! Dispatch of approved actions to the device gateway.
//!
//! The executor owns the `pending -> running -> done | failed` leg of a
//! step's lifecycle. Physical actuations are vetted by the safety policy
//! first; batch actions fan out to every safe actuator of their kind.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::backend::{DeviceDirectory, DeviceGateway, DEVICE_GATEWAY};
use crate::error::{ActionError, DependencyError};
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::rollback;
use crate::safety::{ActuatorMetadata, BatchSelection, OverrideLookup, SafetyPolicy, SafetyVerdict};
use crate::types::{arg_str, describe_call, ActionKind, ActuatorInfo, Actuation, PlanStep, RollbackAction, StepStatus};

/// Successful dispatch outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub message: String,
    pub result: Value,
}

pub struct Executor {
    gateway: Arc<dyn DeviceGateway>,
    directory: Arc<dyn DeviceDirectory>,
    safety: SafetyPolicy,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        directory: Arc<dyn DeviceDirectory>,
        safety: SafetyPolicy,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            directory,
            safety,
            breaker,
            retry,
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run a pending, already-approved step to `done` or `failed`.
    ///
    /// The inverse is captured before dispatch. Cancellation drops the
    /// in-flight dispatch and fails the step with [`ActionError::Cancelled`].
    pub async fn execute(&self, step: &mut PlanStep, cancel: &CancellationToken) -> Result<(), ActionError> {
        step.rollback = rollback::inverse(&step.function, &step.arguments);
        step.transition(StepStatus::Running)?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            outcome = self.dispatch(&step.function, &step.arguments) => outcome,
        };

        match outcome {
            Ok(dispatched) => {
                tracing::debug!(function = %step.function, message = %dispatched.message, "Step done");
                step.settle(StepStatus::Done, dispatched.message, Some(dispatched.result))?;
                Ok(())
            }
            Err(err) => {
                tracing::info!(function = %step.function, error = %err, "Step failed");
                let result = match &err {
                    ActionError::BatchFailed { result, .. } => Some(result.clone()),
                    _ => None,
                };
                step.settle(StepStatus::Failed, err.to_string(), result)?;
                Err(err)
            }
        }
    }

    /// Execute a captured inverse. Runs to completion once started.
    pub async fn undo(&self, rollback: &RollbackAction) -> Result<Dispatched, ActionError> {
        self.dispatch(&rollback.function, &rollback.arguments).await
    }

    /// Dispatch one call by name, applying safety vetting for physical and
    /// batch actions.
    pub async fn dispatch(&self, function: &str, args: &Value) -> Result<Dispatched, ActionError> {
        let kind = ActionKind::from_name(function)
            .ok_or_else(|| ActionError::UnknownAction(function.to_string()))?;

        match kind.spec().actuation {
            Actuation::Standard => self.invoke(function, args).await,
            Actuation::Physical => {
                let actuator_id = arg_str(args, "entity_id")
                    .ok_or_else(|| ActionError::Validation(format!("{}: 'entity_id' is required", kind)))?;
                let info = self.directory.describe(actuator_id).await?;
                let metadata = self.metadata(&info).await;
                if let SafetyVerdict::Denied(reason) = self.safety.evaluate(&info.id, &metadata) {
                    tracing::warn!(actuator = %info.id, function = %function, reason = %reason, "Safety policy denied actuation");
                    return Err(ActionError::SafetyDenial {
                        actuator_id: info.id,
                        reason,
                    });
                }
                self.invoke(function, args).await
            }
            Actuation::Batch { kind: target_kind, per_target } => {
                self.dispatch_batch(target_kind, per_target, args).await
            }
        }
    }

    async fn dispatch_batch(
        &self,
        target_kind: &str,
        per_target: ActionKind,
        args: &Value,
    ) -> Result<Dispatched, ActionError> {
        let candidates = self.directory.list(target_kind).await?;
        let mut vetted = Vec::with_capacity(candidates.len());
        for info in candidates {
            let metadata = self.metadata(&info).await;
            vetted.push((info, metadata));
        }
        let BatchSelection { allowed, skipped } = self.safety.select(vetted);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for target in &allowed {
            let mut target_args = args.clone();
            if let Some(map) = target_args.as_object_mut() {
                map.insert("entity_id".to_string(), Value::String(target.id.clone()));
            }
            match self.invoke(per_target.name(), &target_args).await {
                Ok(_) => succeeded.push((target.id.clone(), target_args)),
                Err(e) => {
                    tracing::info!(actuator = %target.id, error = %e, "Batch target failed");
                    failed.push((target.id.clone(), e.to_string()));
                }
            }
        }

        let mut message = format!(
            "{} {} of {} {}s",
            describe_call(per_target.name(), args),
            succeeded.len(),
            allowed.len(),
            target_kind
        );
        if !skipped.is_empty() {
            let names: Vec<String> = skipped
                .iter()
                .map(|(info, _)| format!("{} ({})", info.name, info.id))
                .collect();
            message.push_str(&format!("; skipped for safety: {}", names.join(", ")));
        }
        let skipped: Vec<Value> = skipped
            .iter()
            .map(|(info, reason)| json!({"id": info.id, "name": info.name, "reason": reason}))
            .collect();

        if failed.is_empty() {
            let targets: Vec<String> = succeeded.into_iter().map(|(id, _)| id).collect();
            return Ok(Dispatched {
                message,
                result: json!({"targets": targets, "skipped": skipped}),
            });
        }

        // The step will end up failed and is never undone as a whole, so
        // put back the targets that did move.
        let (reverted, unreverted) = self.revert_targets(per_target, &succeeded).await;

        let failed_ids: Vec<&str> = failed.iter().map(|(id, _)| id.as_str()).collect();
        message.push_str(&format!("; failed: {}", failed_ids.join(", ")));
        if !reverted.is_empty() {
            message.push_str(&format!("; reverted: {}", reverted.join(", ")));
        }
        if !unreverted.is_empty() {
            message.push_str(&format!("; could not revert: {}", unreverted.join(", ")));
        }

        Err(ActionError::BatchFailed {
            message,
            result: json!({
                "targets": [],
                "failed": failed_ids,
                "reverted": reverted,
                "unreverted": unreverted,
                "skipped": skipped,
            }),
        })
    }

    /// Best-effort undo of the batch targets that succeeded, newest first.
    async fn revert_targets(
        &self,
        per_target: ActionKind,
        succeeded: &[(String, Value)],
    ) -> (Vec<String>, Vec<String>) {
        let mut reverted = Vec::new();
        let mut unreverted = Vec::new();
        for (id, target_args) in succeeded.iter().rev() {
            let Some(inverse) = rollback::inverse(per_target.name(), target_args) else {
                unreverted.push(id.clone());
                continue;
            };
            match self.invoke(&inverse.function, &inverse.arguments).await {
                Ok(_) => reverted.push(id.clone()),
                Err(e) => {
                    tracing::error!(actuator = %id, error = %e, "Batch target revert failed");
                    unreverted.push(id.clone());
                }
            }
        }
        (reverted, unreverted)
    }

    async fn metadata(&self, info: &ActuatorInfo) -> ActuatorMetadata {
        let override_lookup = match self.directory.override_for(&info.id).await {
            Ok(Some(entry)) => OverrideLookup::Found(entry),
            Ok(None) => OverrideLookup::Absent,
            Err(e) => OverrideLookup::Failed(e.to_string()),
        };
        ActuatorMetadata {
            device_class: info.device_class.clone(),
            override_lookup,
        }
    }

    async fn invoke(&self, function: &str, args: &Value) -> Result<Dispatched, ActionError> {
        let gateway = self.gateway.as_ref();
        let timeout = self.timeout;
        let response = self
            .retry
            .run(&self.breaker, move || async move {
                match tokio::time::timeout(timeout, gateway.invoke(function, args)).await {
                    Ok(result) => result,
                    Err(_) => Err(DependencyError::Timeout {
                        dependency: DEVICE_GATEWAY.to_string(),
                        elapsed: timeout,
                    }),
                }
            })
            .await?;

        if response.success {
            Ok(Dispatched {
                result: json!({"message": response.message}),
                message: response.message,
            })
        } else {
            Err(ActionError::Device(response.message))
        }
    }
}
