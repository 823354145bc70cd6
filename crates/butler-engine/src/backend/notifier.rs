//! Bounded, supervised fan-out of progress notifications.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::Notifier;

/// Token-bucket rate limiter for outgoing notifications.
///
/// Allows up to `max_per_minute` notifications, refilling the whole bucket
/// once a minute has passed since the last refill.
pub struct NotificationRateLimiter {
    max_per_minute: u32,
    tokens: Mutex<(u32, Instant)>,
}

impl NotificationRateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            tokens: Mutex::new((max_per_minute, Instant::now())),
        }
    }

    /// Take one token. Returns `false` when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if state.1.elapsed() >= Duration::from_secs(60) {
            state.0 = self.max_per_minute;
            state.1 = Instant::now();
        }
        if state.0 > 0 {
            state.0 -= 1;
            true
        } else {
            false
        }
    }
}

/// Worker pool in front of a [`Notifier`].
///
/// `notify` never awaits the notifier and never fails. Messages beyond the
/// in-flight bound or the per-minute budget are dropped.
pub struct NotificationPool {
    notifier: Arc<dyn Notifier>,
    permits: Arc<Semaphore>,
    limiter: NotificationRateLimiter,
    tasks: Mutex<JoinSet<()>>,
}

impl NotificationPool {
    pub fn new(notifier: Arc<dyn Notifier>, max_in_flight: usize, max_per_minute: u32) -> Self {
        Self {
            notifier,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            limiter: NotificationRateLimiter::new(max_per_minute),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue a notification. Must be called from within a tokio runtime.
    pub fn notify(&self, message: impl Into<String>, metadata: Value) {
        let message = message.into();

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            tracing::debug!(message = %message, "Notification pool full, dropping message");
            return;
        };
        if !self.limiter.try_acquire() {
            tracing::debug!(message = %message, "Notification rate limit reached, dropping message");
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        let mut tasks = self.lock();
        Self::reap(&mut tasks);
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = notifier.notify(&message, &metadata).await {
                tracing::debug!(error = %e, "Notifier failed");
            }
        });
    }

    /// Notifications spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        Self::reap(&mut tasks);
        tasks.len()
    }

    /// Wait for every queued notification to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::warn!(error = %e, "Notification task panicked");
                }
            }
        }
    }

    /// Abort everything still in flight.
    pub fn shutdown(&self) {
        let mut tasks = self.lock();
        let aborted = tasks.len();
        tasks.abort_all();
        if aborted > 0 {
            tracing::debug!(aborted, "Notification tasks aborted");
        }
    }

    fn reap(tasks: &mut JoinSet<()>) {
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::warn!(error = %e, "Notification task panicked");
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
