//! Plan step state machine with validated transitions.
//!
//! pending -> running -> done | failed
//! pending -> blocked
//! done -> rolled_back (undo pass only)

use crate::error::StepError;
use crate::types::StepStatus;

/// Validate that a status transition is allowed.
pub fn validate_transition(from: StepStatus, to: StepStatus) -> Result<(), StepError> {
    let valid = matches!(
        (from, to),
        (StepStatus::Pending, StepStatus::Running)
            | (StepStatus::Pending, StepStatus::Blocked)
            | (StepStatus::Running, StepStatus::Done)
            | (StepStatus::Running, StepStatus::Failed)
            | (StepStatus::Done, StepStatus::RolledBack)
    );

    if valid {
        Ok(())
    } else {
        Err(StepError::InvalidTransition(from, to))
    }
}

/// Whether the step has left the in-flight states.
pub fn is_settled(status: StepStatus) -> bool {
    !matches!(status, StepStatus::Pending | StepStatus::Running)
}
