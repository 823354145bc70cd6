//! Action planning and execution engine for Butler.
//!
//! Turns a request into an iterative sequence of planner-proposed actions,
//! validates and trust-gates each one, executes them through a resilient
//! device gateway client, and rolls back earlier work when a step fails.

pub mod backend;
pub mod confirmation;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod resilience;
pub mod rollback;
pub mod safety;
pub mod step;
pub mod sweeper;
pub mod trust;
pub mod types;
pub mod validator;

pub use backend::{
    DeviceDirectory, DeviceGateway, NotificationPool, NotificationRateLimiter, Notifier, Planner,
    PlannerClient,
};
pub use confirmation::{ConfirmationStore, PendingConfirmation};
pub use error::{ActionError, DependencyError, StepError};
pub use executor::{Dispatched, Executor};
pub use orchestrator::{ActionPlanner, PlanHistory};
pub use resilience::{BreakerPermit, BreakerSnapshot, BreakerState, CircuitBreaker, RetryPolicy};
pub use safety::{ActuatorMetadata, BatchSelection, OverrideLookup, SafetyPolicy, SafetyVerdict};
pub use sweeper::ConfirmationSweeper;
pub use trust::{TrustDecision, TrustGate};
pub use types::{
    ActionKind, ActuatorInfo, ActuatorOverride, ExecutionResult, GatewayResponse, Plan, PlanOutcome,
    PlanSnapshot, PlanStep, PlannerReply, ProposedAction, Request, Role, RollbackAction, StepStatus,
    ToolSpec, Turn,
};
pub use validator::{Validation, Validator};
