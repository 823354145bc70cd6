//! Scripted backends and a harness for end-to-end engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use butler_core::config::{IdentityTrust, LocationRestriction, TrustConfig};
use butler_core::types::TrustTier;
use butler_core::ButlerConfig;
use butler_engine::backend::{DEVICE_GATEWAY, PLANNER};
use butler_engine::{
    ActionPlanner, ActuatorInfo, ActuatorOverride, CircuitBreaker, ConfirmationStore, DependencyError,
    DeviceDirectory, DeviceGateway, Executor, GatewayResponse, NotificationPool, Notifier, Plan,
    Planner, PlannerClient, PlannerReply, ProposedAction, Request, RetryPolicy, Role, SafetyPolicy,
    ToolSpec, TrustGate, Turn,
};

// =============================================================================
// Planners
// =============================================================================

/// Planner that replays a fixed script of replies, then answers "All done."
pub struct ScriptedPlanner {
    name: &'static str,
    replies: Mutex<VecDeque<Result<PlannerReply, DependencyError>>>,
    repeat: Option<Vec<ProposedAction>>,
    delay: Duration,
    conversations: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::named("scripted")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            replies: Mutex::new(VecDeque::new()),
            repeat: None,
            delay: Duration::ZERO,
            conversations: Mutex::new(Vec::new()),
        }
    }

    /// Queue a round proposing `actions`.
    pub fn round(self, actions: Vec<ProposedAction>) -> Self {
        self.reply(Ok(PlannerReply {
            text: String::new(),
            actions,
        }))
    }

    /// Queue a final answer.
    pub fn answer(self, text: &str) -> Self {
        self.reply(Ok(PlannerReply {
            text: text.to_string(),
            actions: vec![],
        }))
    }

    pub fn fail(self, err: DependencyError) -> Self {
        self.reply(Err(err))
    }

    /// Once the script runs out, keep proposing `actions` forever.
    pub fn repeating(mut self, actions: Vec<ProposedAction>) -> Self {
        self.repeat = Some(actions);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn reply(self, reply: Result<PlannerReply, DependencyError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    /// Every conversation the planner was shown, in call order.
    pub fn conversations(&self) -> Vec<Vec<Turn>> {
        self.conversations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    fn name(&self) -> &str {
        self.name
    }

    async fn plan(&self, conversation: &[Turn], _tools: &[ToolSpec]) -> Result<PlannerReply, DependencyError> {
        self.conversations.lock().unwrap().push(conversation.to_vec());
        tokio::time::sleep(self.delay).await;
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        Ok(PlannerReply {
            text: "All done.".to_string(),
            actions: self.repeat.clone().unwrap_or_default(),
        })
    }
}

/// Stateless planner that turns on the light in the room named by the
/// request text, then stops once it sees a tool result.
pub struct EchoPlanner;

#[async_trait]
impl Planner for EchoPlanner {
    fn name(&self) -> &str {
        "echo"
    }

    async fn plan(&self, conversation: &[Turn], _tools: &[ToolSpec]) -> Result<PlannerReply, DependencyError> {
        let last = conversation.last().cloned().unwrap_or_else(|| Turn::new(Role::User, ""));
        if last.role == Role::Tool {
            return Ok(PlannerReply {
                text: "Lights on.".to_string(),
                actions: vec![],
            });
        }
        tokio::task::yield_now().await;
        let room = last.content.rsplit(' ').next().unwrap_or("").to_string();
        Ok(PlannerReply {
            text: String::new(),
            actions: vec![light(&room, "on")],
        })
    }
}

// =============================================================================
// Device gateway and directory
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub enum GatewayFailure {
    /// Transport-level outage, retried by the engine.
    Transient,
    /// Device answered with `success = false`.
    Reported,
}

/// Records every invocation; fails the configured functions.
#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<(String, Value)>>,
    failures: HashMap<String, GatewayFailure>,
    /// Failures that only apply when every listed argument matches.
    call_failures: Vec<(String, Value, GatewayFailure)>,
    delay: Duration,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, function: &str, failure: GatewayFailure) -> Self {
        self.failures.insert(function.to_string(), failure);
        self
    }

    /// Fail `function` only for calls whose arguments include `matching`.
    pub fn failing_call(mut self, function: &str, matching: Value, failure: GatewayFailure) -> Self {
        self.call_failures.push((function.to_string(), matching, failure));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failure_for(&self, function: &str, arguments: &Value) -> Option<GatewayFailure> {
        let matched = self.call_failures.iter().find(|(f, matching, _)| {
            f == function
                && matching
                    .as_object()
                    .map(|m| m.iter().all(|(k, v)| arguments.get(k) == Some(v)))
                    .unwrap_or(false)
        });
        match matched {
            Some((_, _, failure)) => Some(*failure),
            None => self.failures.get(function).copied(),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, function: &str) -> usize {
        self.calls().iter().filter(|(f, _)| f == function).count()
    }
}

#[async_trait]
impl DeviceGateway for MockGateway {
    async fn invoke(&self, function: &str, arguments: &Value) -> Result<GatewayResponse, DependencyError> {
        self.calls
            .lock()
            .unwrap()
            .push((function.to_string(), arguments.clone()));
        tokio::time::sleep(self.delay).await;
        match self.failure_for(function, arguments) {
            Some(GatewayFailure::Transient) => Err(DependencyError::Unavailable {
                dependency: DEVICE_GATEWAY.to_string(),
                message: "503 service unavailable".to_string(),
            }),
            Some(GatewayFailure::Reported) => Ok(GatewayResponse {
                success: false,
                message: format!("{} failed: device offline", function),
            }),
            None => Ok(GatewayResponse {
                success: true,
                message: format!("{} ok", function),
            }),
        }
    }
}

#[derive(Default)]
pub struct MockDirectory {
    actuators: Vec<ActuatorInfo>,
    overrides: HashMap<String, ActuatorOverride>,
}

impl MockDirectory {
    /// Three covers, one of them a garage door.
    pub fn home() -> Self {
        Self {
            actuators: vec![
                actuator("cover.living_room_blind", "Living Room Blind", "blind"),
                actuator("cover.garage_door", "Garage Door", "garage"),
                actuator("cover.bedroom_shade", "Bedroom Shade", "shade"),
            ],
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, id: &str, actuator_type: &str, enabled: bool) -> Self {
        self.overrides.insert(
            id.to_string(),
            ActuatorOverride {
                actuator_type: actuator_type.to_string(),
                enabled,
            },
        );
        self
    }
}

#[async_trait]
impl DeviceDirectory for MockDirectory {
    async fn describe(&self, actuator_id: &str) -> Result<ActuatorInfo, DependencyError> {
        self.actuators
            .iter()
            .find(|a| a.id == actuator_id)
            .cloned()
            .ok_or_else(|| DependencyError::Rejected {
                dependency: "directory".to_string(),
                message: format!("unknown actuator {}", actuator_id),
            })
    }

    async fn list(&self, kind: &str) -> Result<Vec<ActuatorInfo>, DependencyError> {
        let prefix = format!("{}.", kind);
        Ok(self
            .actuators
            .iter()
            .filter(|a| a.id.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn override_for(&self, actuator_id: &str) -> Result<Option<ActuatorOverride>, DependencyError> {
        Ok(self.overrides.get(actuator_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, _metadata: &Value) -> Result<(), DependencyError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub engine: Arc<ActionPlanner>,
    pub gateway: Arc<MockGateway>,
    pub confirmations: Arc<ConfirmationStore>,
    pub notifications: Arc<NotificationPool>,
    pub notifier: Arc<RecordingNotifier>,
    pub planner_breaker: Arc<CircuitBreaker>,
    pub gateway_breaker: Arc<CircuitBreaker>,
}

impl Harness {
    pub fn builder(planner: Arc<dyn Planner>) -> HarnessBuilder {
        HarnessBuilder::new(planner)
    }

    pub async fn run(&self, text: &str, identity: &str) -> Plan {
        self.engine
            .handle(&Request::new(text, identity), &CancellationToken::new())
            .await
    }
}

pub struct HarnessBuilder {
    config: ButlerConfig,
    planner: Arc<dyn Planner>,
    fallback: Option<Arc<dyn Planner>>,
    gateway: MockGateway,
    directory: MockDirectory,
    planner_timeout: Duration,
    confirmation_ttl: Duration,
}

impl HarnessBuilder {
    fn new(planner: Arc<dyn Planner>) -> Self {
        Self {
            config: test_config(),
            planner,
            fallback: None,
            gateway: MockGateway::new(),
            directory: MockDirectory::home(),
            planner_timeout: Duration::from_secs(5),
            confirmation_ttl: Duration::from_secs(60),
        }
    }

    pub fn gateway(mut self, gateway: MockGateway) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn directory(mut self, directory: MockDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn Planner>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn planner_timeout(mut self, timeout: Duration) -> Self {
        self.planner_timeout = timeout;
        self
    }

    pub fn confirmation_ttl(mut self, ttl: Duration) -> Self {
        self.confirmation_ttl = ttl;
        self
    }

    pub fn max_iterations(mut self, n: u32) -> Self {
        self.config.engine.max_iterations = n;
        self
    }

    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.config.engine.step_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn breaker_threshold(mut self, threshold: u32) -> Self {
        self.config.breaker.failure_threshold = threshold;
        self
    }

    pub fn build(self) -> Harness {
        let config = self.config;
        let planner_breaker = Arc::new(CircuitBreaker::from_config(PLANNER, &config.breaker));
        let gateway_breaker = Arc::new(CircuitBreaker::from_config(DEVICE_GATEWAY, &config.breaker));
        let retry = RetryPolicy::from_config(&config.retry);

        let mut client = PlannerClient::new(
            self.planner,
            Arc::clone(&planner_breaker),
            retry.clone(),
            self.planner_timeout,
        );
        if let Some(fallback) = self.fallback {
            client = client.with_fallback(fallback);
        }

        let gateway = Arc::new(self.gateway);
        let executor = Executor::new(
            gateway.clone(),
            Arc::new(self.directory),
            SafetyPolicy::new(&config.safety),
            Arc::clone(&gateway_breaker),
            retry,
            Duration::from_secs(1),
        );

        let confirmations = Arc::new(ConfirmationStore::new(self.confirmation_ttl));
        let notifier = Arc::new(RecordingNotifier::default());
        let notifications = Arc::new(NotificationPool::new(notifier.clone(), 64, 1000));

        let engine = ActionPlanner::new(
            config.engine.clone(),
            client,
            TrustGate::new(&config.trust),
            executor,
            Arc::clone(&confirmations),
            Arc::clone(&notifications),
        );

        Harness {
            engine: Arc::new(engine),
            gateway,
            confirmations,
            notifications,
            notifier,
            planner_breaker,
            gateway_breaker,
        }
    }
}

/// Fast, deterministic settings: no pacing, no backoff.
///
/// `alice` is an owner, `bob` a resident kept out of the garage, anyone else
/// a guest.
pub fn test_config() -> ButlerConfig {
    let mut config = ButlerConfig::default();
    config.engine.step_delay_ms = 0;
    config.retry.backoff_base_secs = 0.0;
    config.breaker.failure_threshold = 10;
    config.trust = TrustConfig {
        identities: vec![
            IdentityTrust {
                identity: "alice".to_string(),
                tier: TrustTier::Owner,
                restricted_locations: vec![],
            },
            IdentityTrust {
                identity: "bob".to_string(),
                tier: TrustTier::Resident,
                restricted_locations: vec![LocationRestriction {
                    location: "garage".to_string(),
                    functions: vec![],
                }],
            },
        ],
    };
    config
}

// =============================================================================
// Action builders
// =============================================================================

pub fn light(room: &str, state: &str) -> ProposedAction {
    ProposedAction::new("turn_light", json!({"room": room, "state": state}))
}

pub fn temperature(room: &str, value: f64) -> ProposedAction {
    ProposedAction::new("set_temperature", json!({"room": room, "temperature": value}))
}

pub fn actuator(id: &str, name: &str, class: &str) -> ActuatorInfo {
    ActuatorInfo {
        id: id.to_string(),
        name: name.to_string(),
        device_class: Some(class.to_string()),
    }
}
