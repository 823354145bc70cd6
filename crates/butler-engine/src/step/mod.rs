//! Plan step lifecycle management.

pub mod state_machine;

use serde_json::Value;

use crate::error::StepError;
use crate::step::state_machine::validate_transition;
use crate::types::{PlanStep, ProposedAction, StepStatus};

impl PlanStep {
    /// A freshly proposed step, not yet validated.
    pub fn proposed(action: &ProposedAction, round: u32) -> Self {
        Self {
            function: action.function.clone(),
            arguments: action.arguments.clone(),
            status: StepStatus::Pending,
            result: None,
            message: String::new(),
            rollback: None,
            round,
        }
    }

    /// Move to `to`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, to: StepStatus) -> Result<(), StepError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    /// Settle the step with an outcome message and optional payload.
    pub fn settle(
        &mut self,
        to: StepStatus,
        message: impl Into<String>,
        result: Option<Value>,
    ) -> Result<(), StepError> {
        self.transition(to)?;
        self.message = message.into();
        if result.is_some() {
            self.result = result;
        }
        Ok(())
    }
}
