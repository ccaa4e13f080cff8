//! Failsafe mechanisms: circuit breaker, windowed health tracking, state notifications

mod circuit_breaker;
mod health;
mod notify;
mod window;

pub use circuit_breaker::{
    BreakerState, BreakerStatus, CircuitBreaker, CircuitBreakerBuilder, Fallback,
    OpenCircuitFallback,
};
pub use health::{FailureRatePredicate, Health, HealthPredicate, HealthReport, HealthTracker};
pub use notify::{
    DEFAULT_STATE_CHANNEL_CAPACITY, StateReceiver, StateSender, default_state_channel, state_channel,
};
pub use window::{MetricBucket, MetricKind, MetricSnapshot, MetricWindow, upper_bound};
