//! Physical actuator safety policy.
//!
//! Decides whether an actuator may be controlled automatically. Three
//! independent signals must all pass: the declared device class, a
//! whole-word scan of the actuator id, and the per-actuator override table.
//! A failed override lookup denies control.

use std::collections::HashSet;

use butler_core::config::SafetyConfig;
use regex::Regex;

use crate::types::{ActuatorInfo, ActuatorOverride};

/// Result of consulting the per-actuator override table.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideLookup {
    Found(ActuatorOverride),
    Absent,
    Failed(String),
}

/// Everything the policy looks at besides the actuator id.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorMetadata {
    pub device_class: Option<String>,
    pub override_lookup: OverrideLookup,
}

/// Allow/deny decision with the reason for a denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allowed,
    Denied(String),
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }
}

/// Split of a batch target list into controllable and skipped actuators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSelection {
    pub allowed: Vec<ActuatorInfo>,
    pub skipped: Vec<(ActuatorInfo, String)>,
}

/// Pure, deterministic safety decision function.
pub struct SafetyPolicy {
    excluded_classes: HashSet<String>,
    keyword_pattern: Option<Regex>,
    /// Set when keywords were configured but could not be compiled.
    keywords_broken: bool,
}

impl SafetyPolicy {
    pub fn new(config: &SafetyConfig) -> Self {
        let excluded_classes = config
            .excluded_device_classes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        let keywords: Vec<String> = config
            .excluded_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(&k))
            .collect();

        // Ids are tokenised on anything that is not a letter or digit, so
        // `cover.garage_door` yields `garage` and `door` but `doorway` does not.
        let (keyword_pattern, keywords_broken) = if keywords.is_empty() {
            (None, false)
        } else {
            let pattern = format!(
                r"(?i)(?:^|[^a-z0-9])(?:{})(?:$|[^a-z0-9])",
                keywords.join("|")
            );
            match Regex::new(&pattern) {
                Ok(re) => (Some(re), false),
                Err(e) => {
                    tracing::error!(error = %e, "Excluded keyword pattern invalid, denying all keyword checks");
                    (None, true)
                }
            }
        };

        Self {
            excluded_classes,
            keyword_pattern,
            keywords_broken,
        }
    }

    /// Full decision with reason.
    pub fn evaluate(&self, actuator_id: &str, metadata: &ActuatorMetadata) -> SafetyVerdict {
        if let Some(class) = &metadata.device_class {
            let class = class.to_lowercase();
            if self.excluded_classes.contains(&class) {
                return SafetyVerdict::Denied(format!("device class '{}' is excluded", class));
            }
        }

        if self.keywords_broken {
            return SafetyVerdict::Denied("keyword screen unavailable".to_string());
        }
        if let Some(re) = &self.keyword_pattern {
            if re.is_match(actuator_id) {
                return SafetyVerdict::Denied(format!(
                    "identifier '{}' names an excluded actuator type",
                    actuator_id
                ));
            }
        }

        match &metadata.override_lookup {
            OverrideLookup::Absent => SafetyVerdict::Allowed,
            OverrideLookup::Found(entry) => {
                if !entry.enabled {
                    SafetyVerdict::Denied("automatic control disabled by override".to_string())
                } else if self
                    .excluded_classes
                    .contains(&entry.actuator_type.to_lowercase())
                {
                    SafetyVerdict::Denied(format!(
                        "override marks actuator as '{}'",
                        entry.actuator_type
                    ))
                } else {
                    SafetyVerdict::Allowed
                }
            }
            OverrideLookup::Failed(err) => {
                SafetyVerdict::Denied(format!("override lookup failed: {}", err))
            }
        }
    }

    pub fn is_safe(&self, actuator_id: &str, metadata: &ActuatorMetadata) -> bool {
        self.evaluate(actuator_id, metadata).is_allowed()
    }

    /// Partition batch targets, keeping input order in both lists.
    pub fn select(&self, candidates: Vec<(ActuatorInfo, ActuatorMetadata)>) -> BatchSelection {
        let mut selection = BatchSelection::default();
        for (info, metadata) in candidates {
            match self.evaluate(&info.id, &metadata) {
                SafetyVerdict::Allowed => selection.allowed.push(info),
                SafetyVerdict::Denied(reason) => {
                    tracing::warn!(actuator = %info.id, reason = %reason, "Skipping unsafe actuator");
                    selection.skipped.push((info, reason));
                }
            }
        }
        selection
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(&SafetyConfig::default())
    }
}
