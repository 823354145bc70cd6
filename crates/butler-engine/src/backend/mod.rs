//! External collaborators the engine drives.
//!
//! Every backend is an object-safe async trait so the composition root can
//! plug in real clients or scripted fakes behind `Arc<dyn _>`.

pub mod notifier;
pub mod planner;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DependencyError;
use crate::types::{ActuatorInfo, ActuatorOverride, GatewayResponse, PlannerReply, ToolSpec, Turn};

pub use notifier::{NotificationPool, NotificationRateLimiter};
pub use planner::PlannerClient;

/// Dependency name used for planner breakers and errors.
pub const PLANNER: &str = "planner";
/// Dependency name used for device gateway breakers and errors.
pub const DEVICE_GATEWAY: &str = "device_gateway";

/// Language-model-backed service that proposes actions.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Propose the next actions given the running transcript.
    ///
    /// An empty `actions` list means the planner considers the request done
    /// and `text` is the final answer.
    async fn plan(&self, conversation: &[Turn], tools: &[ToolSpec]) -> Result<PlannerReply, DependencyError>;
}

/// Service that performs real actuation.
///
/// Unknown function names must come back as `success = false`, never as an
/// error. The gateway guarantees at most one physical effect per call.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn invoke(&self, function: &str, arguments: &Value) -> Result<GatewayResponse, DependencyError>;
}

/// Actuator metadata source consulted by the safety policy.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn describe(&self, actuator_id: &str) -> Result<ActuatorInfo, DependencyError>;

    /// Every actuator of a kind, e.g. `"cover"`.
    async fn list(&self, kind: &str) -> Result<Vec<ActuatorInfo>, DependencyError>;

    async fn override_for(&self, actuator_id: &str) -> Result<Option<ActuatorOverride>, DependencyError>;
}

/// Receiver of human-readable progress messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, metadata: &Value) -> Result<(), DependencyError>;
}
