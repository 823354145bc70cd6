//! Simulated planner and home used by the CLI.
//!
//! A scenario file scripts the planner's replies round by round and
//! describes the actuators, overrides, and gateway faults of a home, so a
//! request can be run end to end without any external service.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use butler_core::Result;
use butler_engine::types::arg_str;
use butler_engine::{
    ActionKind, ActuatorInfo, ActuatorOverride, DependencyError, DeviceDirectory, DeviceGateway,
    GatewayResponse, Notifier, Planner, PlannerReply, ToolSpec, Turn,
};

const DIRECTORY: &str = "device_directory";

/// Scripted planner replies and a simulated home.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Replies returned in order, one per planner call.
    pub rounds: Vec<PlannerReply>,
    /// Final answer once the scripted rounds run out.
    pub final_text: String,
    /// Artificial latency of the primary planner.
    pub planner_delay_ms: u64,
    /// Answer of the fallback planner. No fallback when absent.
    pub fallback_text: Option<String>,
    pub devices: Vec<SimDevice>,
    pub failures: Vec<SimFailure>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            rounds: Vec::new(),
            final_text: "There is nothing for me to do.".to_string(),
            planner_delay_ms: 0,
            fallback_text: None,
            devices: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// One actuator of the simulated home.
#[derive(Debug, Clone, Deserialize)]
pub struct SimDevice {
    /// Kind-prefixed id, e.g. `cover.living_room_blind`.
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default, rename = "override")]
    pub override_entry: Option<ActuatorOverride>,
}

impl SimDevice {
    fn info(&self) -> ActuatorInfo {
        ActuatorInfo {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            device_class: self.device_class.clone(),
        }
    }
}

/// How an injected gateway fault surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Transient transport error, retried.
    Unavailable,
    /// The gateway refuses the call, not retried.
    Rejected,
    /// The call goes through but the device reports `success = false`.
    Reported,
}

/// Gateway fault injected for a function, optionally for one entity only.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFailure {
    pub function: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub mode: FailureMode,
}

impl SimFailure {
    fn matches(&self, function: &str, arguments: &Value) -> bool {
        if self.function != function {
            return false;
        }
        match &self.entity_id {
            Some(id) => arg_str(arguments, "entity_id") == Some(id.as_str()),
            None => true,
        }
    }
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&content)?;
        tracing::info!(
            rounds = scenario.rounds.len(),
            devices = scenario.devices.len(),
            "Scenario loaded from {}",
            path.display()
        );
        Ok(scenario)
    }

    pub fn planner(&self) -> SimPlanner {
        SimPlanner::new("scenario", self.rounds.clone(), &self.final_text)
            .with_delay(Duration::from_millis(self.planner_delay_ms))
    }

    pub fn fallback(&self) -> Option<SimPlanner> {
        self.fallback_text
            .as_deref()
            .map(|text| SimPlanner::new("fallback", Vec::new(), text))
    }

    pub fn gateway(&self) -> SimGateway {
        SimGateway {
            failures: self.failures.clone(),
        }
    }

    pub fn directory(&self) -> SimDirectory {
        SimDirectory {
            devices: self.devices.clone(),
        }
    }
}

// ---- Planner ----

/// Replays scripted replies, then answers with a fixed final text.
pub struct SimPlanner {
    name: String,
    rounds: Mutex<VecDeque<PlannerReply>>,
    final_text: String,
    delay: Duration,
}

impl SimPlanner {
    pub fn new(name: &str, rounds: Vec<PlannerReply>, final_text: &str) -> Self {
        Self {
            name: name.to_string(),
            rounds: Mutex::new(rounds.into()),
            final_text: final_text.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Planner for SimPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn plan(&self, conversation: &[Turn], _tools: &[ToolSpec]) -> std::result::Result<PlannerReply, DependencyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .rounds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        tracing::debug!(planner = %self.name, turns = conversation.len(), scripted = next.is_some(), "Planner call");
        Ok(next.unwrap_or_else(|| PlannerReply {
            text: self.final_text.clone(),
            actions: Vec::new(),
        }))
    }
}

// ---- Gateway ----

/// Accepts every catalog function unless a fault is injected for it.
pub struct SimGateway {
    failures: Vec<SimFailure>,
}

#[async_trait]
impl DeviceGateway for SimGateway {
    async fn invoke(&self, function: &str, arguments: &Value) -> std::result::Result<GatewayResponse, DependencyError> {
        tracing::info!(function, arguments = %arguments, "Gateway call");

        if ActionKind::from_name(function).is_none() {
            return Ok(GatewayResponse {
                success: false,
                message: format!("unknown function {}", function),
            });
        }

        let fault = self
            .failures
            .iter()
            .find(|f| f.matches(function, arguments))
            .map(|f| f.mode);

        match fault {
            Some(FailureMode::Unavailable) => Err(DependencyError::Unavailable {
                dependency: butler_engine::backend::DEVICE_GATEWAY.to_string(),
                message: format!("{} did not respond", function),
            }),
            Some(FailureMode::Rejected) => Err(DependencyError::Rejected {
                dependency: butler_engine::backend::DEVICE_GATEWAY.to_string(),
                message: format!("{} refused", function),
            }),
            Some(FailureMode::Reported) => Ok(GatewayResponse {
                success: false,
                message: format!("{} reported a fault", function),
            }),
            None => Ok(GatewayResponse {
                success: true,
                message: "ok".to_string(),
            }),
        }
    }
}

// ---- Directory ----

pub struct SimDirectory {
    devices: Vec<SimDevice>,
}

impl SimDirectory {
    fn find(&self, actuator_id: &str) -> Option<&SimDevice> {
        self.devices.iter().find(|d| d.id == actuator_id)
    }
}

#[async_trait]
impl DeviceDirectory for SimDirectory {
    async fn describe(&self, actuator_id: &str) -> std::result::Result<ActuatorInfo, DependencyError> {
        self.find(actuator_id)
            .map(SimDevice::info)
            .ok_or_else(|| DependencyError::Rejected {
                dependency: DIRECTORY.to_string(),
                message: format!("unknown actuator {}", actuator_id),
            })
    }

    async fn list(&self, kind: &str) -> std::result::Result<Vec<ActuatorInfo>, DependencyError> {
        let prefix = format!("{}.", kind);
        Ok(self
            .devices
            .iter()
            .filter(|d| d.id.starts_with(&prefix))
            .map(SimDevice::info)
            .collect())
    }

    async fn override_for(&self, actuator_id: &str) -> std::result::Result<Option<ActuatorOverride>, DependencyError> {
        Ok(self.find(actuator_id).and_then(|d| d.override_entry.clone()))
    }
}

// ---- Notifier ----

/// Writes progress messages to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, metadata: &Value) -> std::result::Result<(), DependencyError> {
        tracing::info!(target: "butler::notify", metadata = %metadata, "{}", message);
        Ok(())
    }
}
