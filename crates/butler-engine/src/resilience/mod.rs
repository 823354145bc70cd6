//! Shields the engine from planner and device gateway outages.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerPermit, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use retry::RetryPolicy;
