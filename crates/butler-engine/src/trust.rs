//! Identity trust gate.
//!
//! Answers whether an identity may invoke a function in a location,
//! independently of whether the arguments are valid. A denial is a hard
//! stop; it never turns into a confirmation request.

use std::collections::HashMap;

use butler_core::config::{LocationRestriction, TrustConfig};
use butler_core::types::TrustTier;

use crate::types::ActionKind;

/// Trust gate verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub allowed: bool,
    pub reason: String,
}

impl TrustDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

#[derive(Debug, Clone)]
struct TrustRecord {
    tier: TrustTier,
    restrictions: Vec<LocationRestriction>,
}

/// Lookup of trust records by identity.
pub struct TrustGate {
    records: HashMap<String, TrustRecord>,
}

impl TrustGate {
    pub fn new(config: &TrustConfig) -> Self {
        let records = config
            .identities
            .iter()
            .map(|entry| {
                (
                    entry.identity.clone(),
                    TrustRecord {
                        tier: entry.tier,
                        restrictions: entry.restricted_locations.clone(),
                    },
                )
            })
            .collect();
        Self { records }
    }

    /// Tier for an identity. Unknown identities get the lowest tier.
    pub fn tier_of(&self, identity: &str) -> TrustTier {
        self.records
            .get(identity)
            .map(|r| r.tier)
            .unwrap_or(TrustTier::Guest)
    }

    pub fn can_act(&self, identity: &str, function: &str, location: Option<&str>) -> TrustDecision {
        let Some(kind) = ActionKind::from_name(function) else {
            return TrustDecision::deny(format!("unknown function '{}'", function));
        };

        let tier = self.tier_of(identity);
        let required = kind.spec().min_tier;
        if tier < required {
            return TrustDecision::deny(format!(
                "{} requires {} trust, '{}' is {}",
                function, required, identity, tier
            ));
        }

        if let (Some(record), Some(location)) = (self.records.get(identity), location) {
            let restricted = record.restrictions.iter().any(|r| {
                r.location.eq_ignore_ascii_case(location)
                    && (r.functions.is_empty() || r.functions.iter().any(|f| f == function))
            });
            if restricted {
                return TrustDecision::deny(format!(
                    "'{}' may not use {} in {}",
                    identity, function, location
                ));
            }
        }

        TrustDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_core::config::IdentityTrust;

    fn gate() -> TrustGate {
        TrustGate::new(&TrustConfig {
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
                        location: "office".to_string(),
                        functions: vec!["set_temperature".to_string()],
                    }],
                },
                IdentityTrust {
                    identity: "kid".to_string(),
                    tier: TrustTier::Resident,
                    restricted_locations: vec![LocationRestriction {
                        location: "garage".to_string(),
                        functions: vec![],
                    }],
                },
            ],
        })
    }

    // ---- Tiers ----

    #[test]
    fn test_unknown_identity_is_guest() {
        let gate = gate();
        assert_eq!(gate.tier_of("stranger"), TrustTier::Guest);
        assert!(gate.can_act("stranger", "turn_light", Some("kitchen")).allowed);
        let decision = gate.can_act("stranger", "set_temperature", None);
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason,
            "set_temperature requires resident trust, 'stranger' is guest"
        );
    }

    #[test]
    fn test_owner_may_unlock() {
        assert!(gate().can_act("alice", "unlock_door", Some("hall")).allowed);
    }

    #[test]
    fn test_resident_may_not_unlock() {
        assert!(!gate().can_act("bob", "unlock_door", Some("hall")).allowed);
    }

    #[test]
    fn test_unknown_function_denied() {
        assert!(!gate().can_act("alice", "launch", None).allowed);
    }

    // ---- Location restrictions ----

    #[test]
    fn test_location_restriction_for_one_function() {
        let gate = gate();
        assert!(gate.can_act("bob", "set_temperature", Some("bedroom")).allowed);
        let decision = gate.can_act("bob", "set_temperature", Some("Office"));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "'bob' may not use set_temperature in Office");
        assert!(gate.can_act("bob", "turn_light", Some("office")).allowed);
    }

    #[test]
    fn test_location_restriction_for_all_functions() {
        let gate = gate();
        assert!(!gate.can_act("kid", "turn_light", Some("garage")).allowed);
        assert!(gate.can_act("kid", "turn_light", Some("kitchen")).allowed);
    }

    #[test]
    fn test_no_location_skips_restrictions() {
        assert!(gate().can_act("kid", "turn_light", None).allowed);
    }
}
