use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed since this timestamp, clamped at zero.
    pub fn age_secs(&self) -> u64 {
        (Timestamp::now().0 - self.0).max(0) as u64
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Coarse permission level of an acting identity.
///
/// Ordered from least to most trusted, so tiers compare with `>=`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Unknown or visiting identities. The floor for anyone without a record.
    #[default]
    Guest,
    /// Household members.
    Resident,
    /// Full control, including security-sensitive actuators.
    Owner,
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustTier::Guest => write!(f, "guest"),
            TrustTier::Resident => write!(f, "resident"),
            TrustTier::Owner => write!(f, "owner"),
        }
    }
}

impl std::str::FromStr for TrustTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(TrustTier::Guest),
            "resident" => Ok(TrustTier::Resident),
            "owner" => Ok(TrustTier::Owner),
            _ => Err(format!("Unknown trust tier: {}", s)),
        }
    }
}
