use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ButlerError, Result};
use crate::types::TrustTier;

/// Top-level configuration for the butler.
///
/// Loaded from `~/.butler/config.toml` by default. Each section corresponds
/// to one engine component or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButlerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub trust: TrustConfig,
}

impl ButlerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ButlerConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ButlerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Plan loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum plan -> execute -> replan rounds per request.
    pub max_iterations: u32,
    /// Pause between steps of one round so side effects settle before narrating.
    pub step_delay_ms: u64,
    /// Number of plan snapshots retained for `get_last_plan`.
    pub plan_history: usize,
    /// System context sent as the first planner turn.
    pub system_prompt: String,
}

impl EngineConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            step_delay_ms: 250,
            plan_history: 64,
            system_prompt: "You control a smart home. Propose device actions using the \
                            provided tools, or answer directly when nothing needs to change."
                .to_string(),
        }
    }
}

/// Planner dependency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Retry a timed-out call once against the fallback planner.
    pub fallback_enabled: bool,
}

impl PlannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            fallback_enabled: true,
        }
    }
}

/// Device gateway dependency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Bounded retry settings shared by the planner and the device gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base_secs ^ n` seconds.
    pub backoff_base_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 2.0,
        }
    }
}

/// Circuit breaker settings, applied to each dependency independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds after the last failure before a probe is allowed.
    pub recovery_timeout_secs: u64,
    /// Concurrent probe calls allowed while half-open.
    pub half_open_max_calls: u32,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 1,
        }
    }
}

/// Two-turn confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Lifetime of a pending confirmation in seconds.
    pub ttl_secs: u64,
    /// Interval of the background expiry sweep in seconds.
    pub sweep_interval_secs: u64,
}

impl ConfirmationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 120,
            sweep_interval_secs: 30,
        }
    }
}

/// Progress notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notifications delivered concurrently before new ones are dropped.
    pub max_in_flight: usize,
    /// Token bucket size per minute.
    pub max_per_minute: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            max_per_minute: 30,
        }
    }
}

/// Physical actuator safety settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Device classes that are never controlled automatically.
    pub excluded_device_classes: Vec<String>,
    /// Whole words in an actuator id that mark it as excluded.
    pub excluded_keywords: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        let excluded = vec!["garage".to_string(), "gate".to_string(), "door".to_string()];
        Self {
            excluded_device_classes: excluded.clone(),
            excluded_keywords: excluded,
        }
    }
}

/// Trust records for known identities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub identities: Vec<IdentityTrust>,
}

/// Trust record for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityTrust {
    pub identity: String,
    pub tier: TrustTier,
    #[serde(default)]
    pub restricted_locations: Vec<LocationRestriction>,
}

/// Functions an identity may not invoke in one location.
///
/// An empty `functions` list restricts every function there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRestriction {
    pub location: String,
    #[serde(default)]
    pub functions: Vec<String>,
}
