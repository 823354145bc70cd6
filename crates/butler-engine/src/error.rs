//! Error types for the action engine.

use std::time::Duration;

use serde_json::Value;

use crate::types::StepStatus;

/// Failures talking to an external dependency (planner or device gateway).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DependencyError {
    #[error("{dependency} timed out after {elapsed:?}")]
    Timeout {
        dependency: String,
        elapsed: Duration,
    },
    #[error("{dependency} unavailable: {message}")]
    Unavailable { dependency: String, message: String },
    #[error("{dependency} rejected the request: {message}")]
    Rejected { dependency: String, message: String },
    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

impl DependencyError {
    /// Transient failures worth another attempt. Client-side rejections and
    /// an open breaker are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DependencyError::Timeout { .. } | DependencyError::Unavailable { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DependencyError::Timeout { .. })
    }
}

/// Why a single plan step did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid arguments: {0}")]
    Validation(String),
    #[error("Not permitted: {0}")]
    Authorization(String),
    #[error("Dependency failure: {0}")]
    Dependency(#[from] DependencyError),
    #[error("Safety policy refused to control {actuator_id}: {reason}")]
    SafetyDenial { actuator_id: String, reason: String },
    #[error("Device reported failure: {0}")]
    Device(String),
    /// Some targets of a batch failed; the ones that had succeeded were
    /// reverted where possible. `result` records which.
    #[error("Device reported failure: {message}")]
    BatchFailed { message: String, result: Value },
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Cancelled before completion")]
    Cancelled,
    #[error(transparent)]
    Step(#[from] StepError),
}

impl ActionError {
    /// Short line suitable for the person who made the request.
    ///
    /// Validation and trust reasons are policy text and pass through.
    /// Dependency and device detail stays in the log and the plan record.
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Validation(reason) => format!("I can't do that as asked: {}", reason),
            ActionError::Authorization(reason) => format!("Not permitted: {}", reason),
            ActionError::Dependency(_) => "Couldn't reach the device service.".to_string(),
            ActionError::SafetyDenial { actuator_id, .. } => {
                format!("I won't control {} automatically for safety reasons.", actuator_id)
            }
            ActionError::Device(_) => "The device reported a problem.".to_string(),
            ActionError::BatchFailed { .. } => {
                "Some devices reported a problem, so I put the others back.".to_string()
            }
            ActionError::UnknownAction(function) => format!("I don't know how to {}.", function),
            ActionError::Cancelled => "Cancelled.".to_string(),
            ActionError::Step(_) => "Something went wrong with that step.".to_string(),
        }
    }
}

/// Errors from plan step lifecycle management.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(StepStatus, StepStatus),
}
