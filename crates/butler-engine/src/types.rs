//! Core types and value objects for the action engine.
//!
//! Defines the action catalog, planner/gateway contract records, and the
//! plan/step records the orchestrator builds.

use butler_core::types::{Timestamp, TrustTier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Action catalog
// =============================================================================

/// Every action the engine knows how to execute.
///
/// Planner output names are resolved against this closed set; anything else
/// is rejected before it reaches validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TurnLight,
    SetBrightness,
    SetTemperature,
    SetCover,
    SetAllCovers,
    LockDoor,
    UnlockDoor,
    ActivateScene,
    SetVolume,
}

/// How an action touches hardware, which decides whether SafetyPolicy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    /// No safety vetting beyond validation and trust.
    Standard,
    /// Targets one potentially hazardous actuator named by `entity_id`.
    Physical,
    /// Applies to every actuator of a kind; unsafe targets are skipped.
    Batch { kind: &'static str, per_target: ActionKind },
}

/// Static description of one catalog entry.
#[derive(Debug)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub name: &'static str,
    pub description: &'static str,
    pub min_tier: TrustTier,
    pub actuation: Actuation,
}

const CATALOG: &[ActionSpec] = &[
    ActionSpec {
        kind: ActionKind::TurnLight,
        name: "turn_light",
        description: "Turn the lights in a room on or off",
        min_tier: TrustTier::Guest,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::SetBrightness,
        name: "set_brightness",
        description: "Set light brightness in a room (0-100)",
        min_tier: TrustTier::Guest,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::SetTemperature,
        name: "set_temperature",
        description: "Set the thermostat target temperature for a room in Celsius",
        min_tier: TrustTier::Resident,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::SetCover,
        name: "set_cover",
        description: "Open, close or position a single blind, shade or cover",
        min_tier: TrustTier::Resident,
        actuation: Actuation::Physical,
    },
    ActionSpec {
        kind: ActionKind::SetAllCovers,
        name: "set_all_covers",
        description: "Open or close every cover in the home",
        min_tier: TrustTier::Resident,
        actuation: Actuation::Batch {
            kind: "cover",
            per_target: ActionKind::SetCover,
        },
    },
    ActionSpec {
        kind: ActionKind::LockDoor,
        name: "lock_door",
        description: "Lock a door lock",
        min_tier: TrustTier::Guest,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::UnlockDoor,
        name: "unlock_door",
        description: "Unlock a door lock (always asks for confirmation)",
        min_tier: TrustTier::Owner,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::ActivateScene,
        name: "activate_scene",
        description: "Activate a predefined scene",
        min_tier: TrustTier::Guest,
        actuation: Actuation::Standard,
    },
    ActionSpec {
        kind: ActionKind::SetVolume,
        name: "set_volume",
        description: "Set a media player's volume (0-100)",
        min_tier: TrustTier::Guest,
        actuation: Actuation::Standard,
    },
];

impl ActionKind {
    /// Resolve a planner-supplied function name.
    pub fn from_name(name: &str) -> Option<Self> {
        CATALOG.iter().find(|s| s.name == name).map(|s| s.kind)
    }

    /// Catalog entry for this kind. Positions follow `CATALOG` order.
    pub fn spec(&self) -> &'static ActionSpec {
        match self {
            ActionKind::TurnLight => &CATALOG[0],
            ActionKind::SetBrightness => &CATALOG[1],
            ActionKind::SetTemperature => &CATALOG[2],
            ActionKind::SetCover => &CATALOG[3],
            ActionKind::SetAllCovers => &CATALOG[4],
            ActionKind::LockDoor => &CATALOG[5],
            ActionKind::UnlockDoor => &CATALOG[6],
            ActionKind::ActivateScene => &CATALOG[7],
            ActionKind::SetVolume => &CATALOG[8],
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn all() -> impl Iterator<Item = ActionKind> {
        CATALOG.iter().map(|s| s.kind)
    }

    /// JSON schema of the arguments, as advertised to the planner.
    pub fn parameters(&self) -> Value {
        match self {
            ActionKind::TurnLight => json!({
                "type": "object",
                "properties": {
                    "room": {"type": "string"},
                    "state": {"type": "string", "enum": ["on", "off"]}
                },
                "required": ["room", "state"]
            }),
            ActionKind::SetBrightness => json!({
                "type": "object",
                "properties": {
                    "room": {"type": "string"},
                    "brightness": {"type": "integer", "minimum": 0, "maximum": 100},
                    "previous_brightness": {"type": "integer"}
                },
                "required": ["room", "brightness"]
            }),
            ActionKind::SetTemperature => json!({
                "type": "object",
                "properties": {
                    "room": {"type": "string"},
                    "temperature": {"type": "number", "minimum": 5, "maximum": 35},
                    "previous_temperature": {"type": "number"}
                },
                "required": ["room", "temperature"]
            }),
            ActionKind::SetCover => json!({
                "type": "object",
                "properties": {
                    "entity_id": {"type": "string"},
                    "action": {"type": "string", "enum": ["open", "close"]},
                    "position": {"type": "integer", "minimum": 0, "maximum": 100},
                    "previous_position": {"type": "integer"}
                },
                "required": ["entity_id"]
            }),
            ActionKind::SetAllCovers => json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["open", "close"]}
                },
                "required": ["action"]
            }),
            ActionKind::LockDoor | ActionKind::UnlockDoor => json!({
                "type": "object",
                "properties": {"entity_id": {"type": "string"}},
                "required": ["entity_id"]
            }),
            ActionKind::ActivateScene => json!({
                "type": "object",
                "properties": {"scene": {"type": "string"}},
                "required": ["scene"]
            }),
            ActionKind::SetVolume => json!({
                "type": "object",
                "properties": {
                    "entity_id": {"type": "string"},
                    "volume": {"type": "integer", "minimum": 0, "maximum": 100},
                    "previous_volume": {"type": "integer"}
                },
                "required": ["entity_id", "volume"]
            }),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::from_name(s).ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// Tool description handed to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The full tool catalog in registry order.
pub fn tool_catalog() -> Vec<ToolSpec> {
    ActionKind::all()
        .map(|kind| ToolSpec {
            name: kind.name().to_string(),
            description: kind.spec().description.to_string(),
            parameters: kind.parameters(),
        })
        .collect()
}

// =============================================================================
// Planner / gateway contract records
// =============================================================================

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One planner-facing conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An action proposed by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub function: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ProposedAction {
    pub fn new(function: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }

    /// `turn_light(room=kitchen, state=on)`
    pub fn describe(&self) -> String {
        describe_call(&self.function, &self.arguments)
    }
}

/// Planner response: either a final answer (no actions) or more work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerReply {
    pub text: String,
    #[serde(default)]
    pub actions: Vec<ProposedAction>,
}

/// Device gateway outcome for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub success: bool,
    pub message: String,
}

/// Directory metadata about a single actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorInfo {
    pub id: String,
    pub name: String,
    pub device_class: Option<String>,
}

/// Per-actuator override entry from the device directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorOverride {
    pub actuator_type: String,
    pub enabled: bool,
}

// =============================================================================
// Plan records
// =============================================================================

/// Lifecycle of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    Blocked,
    RolledBack,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Blocked => write!(f, "blocked"),
            StepStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "done" => Ok(StepStatus::Done),
            "failed" => Ok(StepStatus::Failed),
            "blocked" => Ok(StepStatus::Blocked),
            "rolled_back" => Ok(StepStatus::RolledBack),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// Semantic inverse of an executed action, captured before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackAction {
    pub function: String,
    pub arguments: Value,
}

/// One proposed-and-tracked action within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub function: String,
    pub arguments: Value,
    pub status: StepStatus,
    /// Opaque outcome payload (gateway message, skipped actuators, ...).
    pub result: Option<Value>,
    /// Human-readable outcome line.
    pub message: String,
    pub rollback: Option<RollbackAction>,
    /// Planner round the step was proposed in, starting at 1.
    pub round: u32,
}

/// How a plan's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
    InProgress,
    Complete,
    MaxIterations,
    PlannerFailed,
    Cancelled,
}

/// The full record of one request's multi-step execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub request_id: Uuid,
    pub request: String,
    pub identity: String,
    pub steps: Vec<PlanStep>,
    pub summary: String,
    pub iterations: u32,
    pub outcome: PlanOutcome,
    pub confirmation_needed: bool,
    pub confirmation_reasons: Vec<String>,
    pub rollback_performed: bool,
    pub created_at: Timestamp,
}

/// Read-only copy of a finished plan.
pub type PlanSnapshot = Plan;

impl Plan {
    pub fn new(request_id: Uuid, request: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            request_id,
            request: request.into(),
            identity: identity.into(),
            steps: Vec::new(),
            summary: String::new(),
            iterations: 0,
            outcome: PlanOutcome::InProgress,
            confirmation_needed: false,
            confirmation_reasons: Vec::new(),
            rollback_performed: false,
            created_at: Timestamp::now(),
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// "N of M actions completed". Rolled-back steps do not count as completed.
    pub fn progress_line(&self) -> String {
        format!(
            "{} of {} actions completed",
            self.count(StepStatus::Done),
            self.steps.len()
        )
    }
}

/// A request entering the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub text: String,
    pub identity: String,
    /// Where the request came from; used when an action names no room.
    pub location: Option<String>,
    /// Prior conversation turns, oldest first.
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl Request {
    pub fn new(text: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            identity: identity.into(),
            location: None,
            history: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Outcome of executing a single action outside a plan (confirmations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub function: String,
    pub status: StepStatus,
    pub message: String,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Done
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

pub fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub fn arg_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(|v| v.as_f64())
}

/// `function(key=value, ...)` with keys in map order.
pub fn describe_call(function: &str, args: &Value) -> String {
    let rendered = match args.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{}={}", k, s),
                None => format!("{}={}", k, v),
            })
            .collect::<Vec<_>>()
            .join(", "),
        None => String::new(),
    };
    format!("{}({})", function, rendered)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ---- ActionKind ----

    #[test]
    fn test_action_kind_resolves_every_catalog_name() {
        for kind in ActionKind::all() {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.to_string(), kind.name());
        }
        assert_eq!(ActionKind::all().count(), 9);
    }

    #[test]
    fn test_action_kind_unknown_name() {
        assert_eq!(ActionKind::from_name("open_pod_bay_doors"), None);
        assert!("open_pod_bay_doors".parse::<ActionKind>().is_err());
        assert_eq!("turn_light".parse::<ActionKind>().unwrap(), ActionKind::TurnLight);
    }

    #[test]
    fn test_action_kind_spec_matches_variant() {
        for kind in ActionKind::all() {
            assert_eq!(kind.spec().kind, kind);
        }
        assert_eq!(ActionKind::UnlockDoor.spec().min_tier, TrustTier::Owner);
        assert_eq!(ActionKind::SetCover.spec().actuation, Actuation::Physical);
        assert!(matches!(
            ActionKind::SetAllCovers.spec().actuation,
            Actuation::Batch { kind: "cover", per_target: ActionKind::SetCover }
        ));
    }

    #[test]
    fn test_every_variant_has_its_own_catalog_entry() {
        let kinds = [
            (ActionKind::TurnLight, "turn_light"),
            (ActionKind::SetBrightness, "set_brightness"),
            (ActionKind::SetTemperature, "set_temperature"),
            (ActionKind::SetCover, "set_cover"),
            (ActionKind::SetAllCovers, "set_all_covers"),
            (ActionKind::LockDoor, "lock_door"),
            (ActionKind::UnlockDoor, "unlock_door"),
            (ActionKind::ActivateScene, "activate_scene"),
            (ActionKind::SetVolume, "set_volume"),
        ];
        for (kind, name) in kinds {
            assert_eq!(kind.spec().kind, kind);
            assert_eq!(kind.name(), name);
            assert_eq!(ActionKind::from_name(name), Some(kind));
        }
        assert_eq!(kinds.len(), CATALOG.len());
    }

    #[test]
    fn test_tool_catalog_exposes_parameters() {
        let catalog = tool_catalog();
        assert_eq!(catalog.len(), 9);
        let light = catalog.iter().find(|t| t.name == "turn_light").unwrap();
        assert_eq!(light.parameters["required"], json!(["room", "state"]));
        assert!(!light.description.is_empty());
    }

    // ---- StepStatus ----

    #[test]
    fn test_step_status_display_and_parse() {
        for status in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Done,
            StepStatus::Failed,
            StepStatus::Blocked,
            StepStatus::RolledBack,
        ] {
            assert_eq!(status.to_string().parse::<StepStatus>().unwrap(), status);
        }
        assert_eq!(StepStatus::RolledBack.to_string(), "rolled_back");
        assert!("exploded".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_step_status_serde_matches_display() {
        let json = serde_json::to_string(&StepStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }

    // ---- Plan ----

    #[test]
    fn test_plan_progress_line() {
        let mut plan = Plan::new(Uuid::new_v4(), "lights", "alice");
        assert_eq!(plan.progress_line(), "0 of 0 actions completed");
        for status in [StepStatus::Done, StepStatus::Failed, StepStatus::RolledBack] {
            plan.steps.push(PlanStep {
                function: "turn_light".to_string(),
                arguments: json!({}),
                status,
                result: None,
                message: String::new(),
                rollback: None,
                round: 1,
            });
        }
        assert_eq!(plan.progress_line(), "1 of 3 actions completed");
        assert_eq!(plan.outcome, PlanOutcome::InProgress);
    }

    // ---- Helpers ----

    #[test]
    fn test_describe_call() {
        let action = ProposedAction::new(
            "set_brightness",
            json!({"room": "kitchen", "brightness": 40}),
        );
        assert_eq!(action.describe(), "set_brightness(brightness=40, room=kitchen)");
        assert_eq!(describe_call("noop", &Value::Null), "noop()");
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({"room": "den", "temperature": 21.5, "count": 3});
        assert_eq!(arg_str(&args, "room"), Some("den"));
        assert_eq!(arg_str(&args, "temperature"), None);
        assert_eq!(arg_f64(&args, "temperature"), Some(21.5));
        assert_eq!(arg_f64(&args, "count"), Some(3.0));
        assert_eq!(arg_f64(&args, "missing"), None);
    }

    #[test]
    fn test_request_builder() {
        let req = Request::new("lights off", "alice").with_location("kitchen");
        assert_eq!(req.location.as_deref(), Some("kitchen"));
        assert!(req.history.is_empty());
    }
}
