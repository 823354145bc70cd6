//! Action planning orchestrator.
//!
//! Drives the bounded plan -> execute -> feedback -> replan loop for one
//! request, gating every proposed action through the validator and trust
//! gate, and undoing earlier work when a step fails.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use butler_core::config::EngineConfig;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{NotificationPool, PlannerClient};
use crate::confirmation::ConfirmationStore;
use crate::error::ActionError;
use crate::executor::Executor;
use crate::trust::TrustGate;
use crate::types::{
    arg_str, describe_call, tool_catalog, ExecutionResult, Plan, PlanOutcome, PlanSnapshot, PlanStep,
    ProposedAction, Request, Role, StepStatus, Turn,
};
use crate::validator::{Validation, Validator};

/// Shown to users when the planner cannot be reached. Details go to the log.
const DEGRADED_SERVICE: &str = "Sorry, I can't reach my planning service right now.";

/// Gate decision for one proposed action.
enum Admission {
    Proceed,
    Block(ActionError),
    Confirm(String),
}

/// How a round of steps ended.
enum RoundEnd {
    Finished,
    Cancelled,
}

/// Bounded store of the most recent plan snapshots, oldest evicted first.
pub struct PlanHistory {
    capacity: usize,
    plans: VecDeque<PlanSnapshot>,
}

impl PlanHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            plans: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, plan: PlanSnapshot) {
        if self.capacity == 0 {
            return;
        }
        self.plans.retain(|p| p.request_id != plan.request_id);
        while self.plans.len() >= self.capacity {
            self.plans.pop_front();
        }
        self.plans.push_back(plan);
    }

    pub fn get(&self, request_id: Uuid) -> Option<PlanSnapshot> {
        self.plans.iter().find(|p| p.request_id == request_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// The orchestrator. Shared across concurrent requests; every method takes
/// `&self`.
pub struct ActionPlanner {
    config: EngineConfig,
    planner: PlannerClient,
    validator: Validator,
    trust: TrustGate,
    executor: Executor,
    confirmations: Arc<ConfirmationStore>,
    notifications: Arc<NotificationPool>,
    history: Mutex<PlanHistory>,
}

impl ActionPlanner {
    pub fn new(
        config: EngineConfig,
        planner: PlannerClient,
        trust: TrustGate,
        executor: Executor,
        confirmations: Arc<ConfirmationStore>,
        notifications: Arc<NotificationPool>,
    ) -> Self {
        let history = Mutex::new(PlanHistory::new(config.plan_history));
        Self {
            config,
            planner,
            validator: Validator,
            trust,
            executor,
            confirmations,
            notifications,
            history,
        }
    }

    /// Run a request to a terminal plan.
    ///
    /// Never fails: every error resolves to a step status or to the plan's
    /// outcome and summary.
    pub async fn handle(&self, request: &Request, cancel: &CancellationToken) -> Plan {
        let mut plan = Plan::new(request.id, &request.text, &request.identity);
        let tools = tool_catalog();
        let mut conversation = self.conversation(request);
        let max_iterations = self.config.max_iterations.max(1);

        tracing::info!(request_id = %request.id, identity = %request.identity, "Planning request");

        for round in 1..=max_iterations {
            if cancel.is_cancelled() {
                return self.finish_cancelled(plan);
            }
            plan.iterations = round;

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.finish_cancelled(plan),
                reply = self.planner.plan(&conversation, &tools) => reply,
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(request_id = %request.id, round, error = %e, "Planner call failed");
                    plan.outcome = PlanOutcome::PlannerFailed;
                    plan.summary = format!("{} {}.", DEGRADED_SERVICE, plan.progress_line());
                    return self.finish(plan);
                }
            };

            if reply.actions.is_empty() {
                plan.outcome = PlanOutcome::Complete;
                plan.summary = self.complete_summary(&plan, &reply.text);
                return self.finish(plan);
            }

            tracing::debug!(request_id = %request.id, round, proposed = reply.actions.len(), "Planner proposed actions");
            conversation.push(Turn::new(Role::Assistant, proposal_turn(&reply.text, &reply.actions)));

            let first = plan.steps.len();
            plan.steps
                .extend(reply.actions.iter().map(|a| PlanStep::proposed(a, round)));

            let end = self.run_round(&mut plan, first, request, cancel).await;
            conversation.push(Turn::new(Role::Tool, round_report(&plan.steps[first..])));

            if let RoundEnd::Cancelled = end {
                return self.finish_cancelled(plan);
            }
        }

        tracing::warn!(request_id = %request.id, max_iterations, "Iteration limit reached");
        plan.outcome = PlanOutcome::MaxIterations;
        plan.summary = with_rollback_notice(&plan, format!("{}.", plan.progress_line()));
        self.finish(plan)
    }

    /// Execute the identity's pending confirmation, if it is still live.
    ///
    /// Trust is re-checked at confirmation time; validation already ran when
    /// the confirmation was raised.
    pub async fn confirm(&self, identity: &str) -> Option<ExecutionResult> {
        let pending = self.confirmations.take(identity)?;
        let location = arg_str(&pending.arguments, "room").or(pending.location.as_deref());

        let decision = self.trust.can_act(identity, &pending.function, location);
        if !decision.allowed {
            tracing::info!(identity = %identity, function = %pending.function, reason = %decision.reason, "Confirmed action denied");
            return Some(ExecutionResult {
                function: pending.function,
                status: StepStatus::Blocked,
                message: ActionError::Authorization(decision.reason).to_string(),
            });
        }

        let action = ProposedAction::new(pending.function, pending.arguments);
        let mut step = PlanStep::proposed(&action, 0);
        let outcome = self.executor.execute(&mut step, &CancellationToken::new()).await;
        if let Err(ref e) = outcome {
            tracing::info!(identity = %identity, function = %step.function, error = %e, "Confirmed action failed");
        }
        let error = outcome.err();
        self.notify_step(None, &step, error.as_ref());

        let message = match error {
            Some(e) => e.user_message(),
            None => step.message,
        };
        Some(ExecutionResult {
            function: step.function,
            status: step.status,
            message,
        })
    }

    /// Drop the identity's pending confirmation.
    pub fn reject(&self, identity: &str) -> bool {
        let rejected = self.confirmations.reject(identity);
        tracing::debug!(identity = %identity, rejected, "Confirmation rejected");
        rejected
    }

    /// Snapshot of a recent plan by request id.
    pub fn get_last_plan(&self, request_id: Uuid) -> Option<PlanSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(request_id)
    }

    async fn run_round(
        &self,
        plan: &mut Plan,
        first: usize,
        request: &Request,
        cancel: &CancellationToken,
    ) -> RoundEnd {
        for idx in first..plan.steps.len() {
            if idx > first && !self.config.step_delay().is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.step_delay()) => {}
                }
            }
            if cancel.is_cancelled() {
                block_remaining(plan, idx, "cancelled before execution");
                return RoundEnd::Cancelled;
            }

            match self.admit(&plan.steps[idx], request) {
                Admission::Proceed => {}
                Admission::Block(err) => {
                    tracing::info!(request_id = %request.id, function = %plan.steps[idx].function, reason = %err, "Step blocked");
                    settle(&mut plan.steps[idx], StepStatus::Blocked, err.to_string());
                    self.notify_step(Some(request.id), &plan.steps[idx], Some(&err));
                    continue;
                }
                Admission::Confirm(reason) => {
                    let step = &plan.steps[idx];
                    self.confirmations.request(
                        &request.identity,
                        &step.function,
                        step.arguments.clone(),
                        request.location.clone(),
                        reason.clone(),
                    );
                    let prompt = format!(
                        "Please confirm {} ({})",
                        describe_call(&step.function, &step.arguments),
                        reason
                    );
                    plan.confirmation_needed = true;
                    plan.confirmation_reasons.push(reason.clone());

                    let step = &mut plan.steps[idx];
                    settle(step, StepStatus::Blocked, format!("awaiting confirmation: {}", reason));
                    step.result = Some(json!({"confirmation_required": true, "reason": reason}));
                    self.notifications.notify(
                        prompt,
                        json!({"request_id": request.id, "function": step.function, "confirmation": true}),
                    );
                    continue;
                }
            }

            let outcome = self.executor.execute(&mut plan.steps[idx], cancel).await;
            self.notify_step(Some(request.id), &plan.steps[idx], outcome.as_ref().err());
            match outcome {
                Ok(()) => {}
                Err(ActionError::Cancelled) => {
                    block_remaining(plan, idx + 1, "cancelled before execution");
                    return RoundEnd::Cancelled;
                }
                Err(err) => {
                    tracing::warn!(request_id = %request.id, step = idx, error = %err, "Step failed, rolling back");
                    block_remaining(plan, idx + 1, "skipped after an earlier failure");
                    self.roll_back(plan, request.id, cancel).await;
                    return RoundEnd::Finished;
                }
            }
        }
        RoundEnd::Finished
    }

    fn admit(&self, step: &PlanStep, request: &Request) -> Admission {
        let confirmation = match self.validator.validate(&step.function, &step.arguments) {
            Validation::Ok => None,
            Validation::Blocked(reason) => return Admission::Block(ActionError::Validation(reason)),
            Validation::NeedsConfirmation(reason) => Some(reason),
        };

        let location = arg_str(&step.arguments, "room").or(request.location.as_deref());
        let decision = self.trust.can_act(&request.identity, &step.function, location);
        if !decision.allowed {
            return Admission::Block(ActionError::Authorization(decision.reason));
        }

        match confirmation {
            Some(reason) => Admission::Confirm(reason),
            None => Admission::Proceed,
        }
    }

    /// Undo every `done` step with an inverse, newest first.
    ///
    /// Best-effort: a failed undo is logged and the pass continues. An undo
    /// already in flight is never interrupted; cancellation is observed only
    /// between undo steps.
    async fn roll_back(&self, plan: &mut Plan, request_id: Uuid, cancel: &CancellationToken) {
        for idx in (0..plan.steps.len()).rev() {
            if cancel.is_cancelled() {
                tracing::warn!(request_id = %request_id, "Rollback interrupted by cancellation");
                return;
            }
            let step = &mut plan.steps[idx];
            if step.status != StepStatus::Done {
                continue;
            }
            let Some(inverse) = step.rollback.clone() else {
                continue;
            };

            match self.executor.undo(&inverse).await {
                Ok(_) => {
                    let message = format!("{} (undone)", step.message);
                    settle(step, StepStatus::RolledBack, message);
                    plan.rollback_performed = true;
                    tracing::info!(
                        request_id = %request_id,
                        step = idx,
                        inverse = %describe_call(&inverse.function, &inverse.arguments),
                        "Step rolled back"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        step = idx,
                        function = %step.function,
                        error = %e,
                        "Rollback failed"
                    );
                }
            }
        }
    }

    fn conversation(&self, request: &Request) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(request.history.len() + 2);
        turns.push(Turn::new(Role::System, self.config.system_prompt.clone()));
        turns.extend(request.history.iter().cloned());
        let speaker = match &request.location {
            Some(location) => format!("{} in {}", request.identity, location),
            None => request.identity.clone(),
        };
        turns.push(Turn::new(Role::User, format!("[{}] {}", speaker, request.text)));
        turns
    }

    fn complete_summary(&self, plan: &Plan, text: &str) -> String {
        let text = text.trim();
        let base = if text.is_empty() {
            format!("{}.", plan.progress_line())
        } else {
            text.to_string()
        };
        with_rollback_notice(plan, base)
    }

    fn finish_cancelled(&self, mut plan: Plan) -> Plan {
        plan.outcome = PlanOutcome::Cancelled;
        plan.summary = with_rollback_notice(
            &plan,
            format!("Request cancelled after {}.", plan.progress_line()),
        );
        self.finish(plan)
    }

    fn finish(&self, plan: Plan) -> Plan {
        tracing::info!(
            request_id = %plan.request_id,
            outcome = ?plan.outcome,
            iterations = plan.iterations,
            steps = plan.steps.len(),
            done = plan.count(StepStatus::Done),
            failed = plan.count(StepStatus::Failed),
            blocked = plan.count(StepStatus::Blocked),
            rolled_back = plan.count(StepStatus::RolledBack),
            "Plan finished"
        );
        self.notifications.notify(
            plan.summary.clone(),
            json!({"request_id": plan.request_id, "outcome": plan.outcome}),
        );
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(plan.clone());
        plan
    }

    /// Tell the requester how a step ended. Failures are reported with
    /// their user-facing line; the full detail stays on the step.
    fn notify_step(&self, request_id: Option<Uuid>, step: &PlanStep, error: Option<&ActionError>) {
        let message = match error {
            Some(e) => e.user_message(),
            None => step.message.clone(),
        };
        self.notifications.notify(
            message,
            json!({
                "request_id": request_id,
                "function": step.function,
                "status": step.status,
            }),
        );
    }
}

/// Settle a step, logging instead of failing on an illegal transition.
fn settle(step: &mut PlanStep, to: StepStatus, message: String) {
    if let Err(e) = step.settle(to, message, None) {
        tracing::error!(function = %step.function, error = %e, "Step settled out of order");
    }
}

fn block_remaining(plan: &mut Plan, from: usize, reason: &str) {
    for step in plan.steps.iter_mut().skip(from) {
        if step.status == StepStatus::Pending {
            settle(step, StepStatus::Blocked, reason.to_string());
        }
    }
}

fn with_rollback_notice(plan: &Plan, base: String) -> String {
    if plan.rollback_performed {
        format!(
            "{} Undid {} earlier action(s) after a failure.",
            base,
            plan.count(StepStatus::RolledBack)
        )
    } else {
        base
    }
}

fn proposal_turn(text: &str, actions: &[ProposedAction]) -> String {
    let calls: Vec<String> = actions.iter().map(ProposedAction::describe).collect();
    if text.trim().is_empty() {
        format!("Calling: {}", calls.join("; "))
    } else {
        format!("{}\nCalling: {}", text.trim(), calls.join("; "))
    }
}

/// Compact per-step results fed back to the planner.
fn round_report(steps: &[PlanStep]) -> String {
    steps
        .iter()
        .map(|s| {
            format!(
                "{} -> {}: {}",
                describe_call(&s.function, &s.arguments),
                s.status,
                s.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
