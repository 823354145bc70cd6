//! Two-turn "are you sure?" confirmations.
//!
//! Holds at most one outstanding confirmation per identity. A newer request
//! for the same identity replaces the older one, since only the latest ask
//! is actionable. Expiry is enforced on every read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use butler_core::types::Timestamp;
use serde_json::Value;
use uuid::Uuid;

/// A blocked action waiting for its requester's approval.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub function: String,
    pub arguments: Value,
    pub identity: String,
    pub location: Option<String>,
    pub reason: String,
    pub created_at: Timestamp,
    pub ttl: Duration,
    expires_at: Instant,
}

impl PendingConfirmation {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// TTL-keyed store of pending confirmations, one per identity.
pub struct ConfirmationStore {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl ConfirmationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record a confirmation request, replacing any earlier one for `identity`.
    pub fn request(
        &self,
        identity: &str,
        function: &str,
        arguments: Value,
        location: Option<String>,
        reason: String,
    ) -> Uuid {
        let confirmation = PendingConfirmation {
            id: Uuid::new_v4(),
            function: function.to_string(),
            arguments,
            identity: identity.to_string(),
            location,
            reason,
            created_at: Timestamp::now(),
            ttl: self.ttl,
            expires_at: Instant::now() + self.ttl,
        };
        let id = confirmation.id;

        let replaced = self.lock().insert(identity.to_string(), confirmation);
        if let Some(old) = replaced {
            tracing::debug!(
                identity = %identity,
                replaced = %old.function,
                function = %function,
                "Pending confirmation replaced"
            );
        }
        id
    }

    /// Remove and return the identity's confirmation if it is still live.
    ///
    /// Lookup and removal happen under one lock, so two racing confirms for
    /// the same identity can never both receive the action.
    pub fn take(&self, identity: &str) -> Option<PendingConfirmation> {
        let confirmation = self.lock().remove(identity)?;
        if confirmation.is_expired() {
            tracing::debug!(identity = %identity, function = %confirmation.function, "Confirmation expired");
            return None;
        }
        Some(confirmation)
    }

    /// Drop the identity's confirmation. Returns whether a live one existed.
    pub fn reject(&self, identity: &str) -> bool {
        match self.lock().remove(identity) {
            Some(confirmation) => !confirmation.is_expired(),
            None => false,
        }
    }

    /// The identity's live confirmation, without consuming it.
    pub fn peek(&self, identity: &str) -> Option<PendingConfirmation> {
        self.lock()
            .get(identity)
            .filter(|c| !c.is_expired())
            .cloned()
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, c| !c.is_expired());
        before - pending.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingConfirmation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
