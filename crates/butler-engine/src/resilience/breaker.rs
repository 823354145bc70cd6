//! Per-dependency circuit breaker.
//!
//! CLOSED -> OPEN after `failure_threshold` consecutive failures.
//! OPEN -> HALF_OPEN once `recovery_timeout` has passed since the last
//! failure, evaluated lazily whenever the state is read.
//! HALF_OPEN admits up to `half_open_max_calls` probes; a probe success
//! closes the breaker, a probe failure reopens it. A probe abandoned
//! without an outcome (its call was dropped) hands its slot back.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use butler_core::config::BreakerConfig;
use serde::Serialize;

/// Breaker state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    probes_in_flight: u32,
    /// Bumped on every entry into HALF_OPEN so stale permits cannot free
    /// slots of a later half-open window.
    generation: u64,
}

/// Point-in-time view of a breaker, for logging and status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failures: u32,
}

/// Failure tracker gating calls to one flaky dependency.
///
/// Shared between plan workers behind an `Arc`; every read and update
/// happens under a single mutex so transitions are atomic per breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        half_open_max_calls: u32,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            half_open_max_calls: half_open_max_calls.max(1),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                probes_in_flight: 0,
                generation: 0,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            config.recovery_timeout(),
            config.half_open_max_calls,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, after applying any pending OPEN -> HALF_OPEN move.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
        }
    }

    /// Whether a call may be attempted now.
    ///
    /// In HALF_OPEN a `true` answer claims one probe slot, released by the
    /// following `record_success` or `record_failure`. Callers that may be
    /// dropped mid-call should use [`CircuitBreaker::try_acquire`] instead.
    pub fn is_available(&self) -> bool {
        self.try_acquire().map(BreakerPermit::keep).is_some()
    }

    /// Admit one call, returning a permit that reports its outcome.
    ///
    /// A permit dropped without `success` or `failure` gives its half-open
    /// probe slot back, so a cancelled probe never wedges the breaker.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        let probe = match inner.state {
            BreakerState::Closed => None,
            BreakerState::Open => return None,
            BreakerState::HalfOpen => {
                if inner.probes_in_flight >= self.half_open_max_calls {
                    return None;
                }
                inner.probes_in_flight += 1;
                Some(inner.generation)
            }
        };
        Some(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            // Decay rather than reset so isolated failures never add up to a trip.
            BreakerState::Closed => inner.failures = inner.failures.saturating_sub(1),
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.probes_in_flight = 0;
                tracing::info!(dependency = %self.name, "Circuit closed after successful probe");
            }
            // A call admitted before the breaker opened finished late.
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::Closed => {
                if inner.failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(
                        dependency = %self.name,
                        failures = inner.failures,
                        "Circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.probes_in_flight = 0;
                tracing::warn!(dependency = %self.name, "Probe failed, circuit reopened");
            }
            BreakerState::Open => {}
        }
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Open {
            return;
        }
        let recovered = inner
            .last_failure
            .map(|at| at.elapsed() >= self.recovery_timeout)
            .unwrap_or(true);
        if recovered {
            inner.state = BreakerState::HalfOpen;
            inner.probes_in_flight = 0;
            inner.generation = inner.generation.wrapping_add(1);
            tracing::info!(dependency = %self.name, "Circuit half-open, allowing probe");
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen
            && inner.generation == generation
            && inner.probes_in_flight > 0
        {
            inner.probes_in_flight -= 1;
            tracing::debug!(dependency = %self.name, "Abandoned probe released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Admission to call a dependency, obtained from [`CircuitBreaker::try_acquire`].
#[must_use = "a permit dropped without an outcome is treated as abandoned"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// Half-open window this permit holds a probe slot in.
    probe: Option<u64>,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }

    /// Leave the slot claimed for a later `record_*` call.
    fn keep(mut self) {
        self.settled = true;
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(generation) = self.probe {
            self.breaker.release_probe(generation);
        }
    }
}
