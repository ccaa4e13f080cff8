//! Circuit breaker state machine
//!
//! Every call runs through the same ordered checks:
//!
//! ```text
//! Open, sleep window not elapsed  → fallback
//! Open, sleep window elapsed      → HalfOpen, continue
//! Closed and window unhealthy     → Open, fallback
//! otherwise                       → run operation, record Success/Error
//! ```
//!
//! A half-open breaker skips the health check and lets calls through. It only
//! leaves half-open through [`CircuitBreaker::set_status`]; probe outcomes are
//! recorded but never move the breaker on their own.
//!
//! The decision is made under the state lock. The operation and the fallback
//! run after it is released.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use telemetry_metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::health::{Health, HealthPredicate, HealthTracker};
use super::notify::{self, StateReceiver, StateSender};
use super::window::MetricKind;
use crate::clock::{Clock, SystemClock, millis_between};
use crate::config::{BreakerConfig, BreakerSettings};
use crate::error::{CircuitOpenError, Error};

/// Breaker mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(i64)]
pub enum BreakerStatus {
    /// Calls are short-circuited to the fallback
    Open = 1,
    /// Calls pass through without a health check
    HalfOpen = 2,
    /// Calls pass through while the window is healthy
    Closed = 3,
}

impl BreakerStatus {
    /// Lowercase label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::HalfOpen => "half-open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for BreakerStatus {
    type Error = Error;

    fn try_from(ordinal: i64) -> Result<Self, Error> {
        match ordinal {
            1 => Ok(Self::Open),
            2 => Ok(Self::HalfOpen),
            3 => Ok(Self::Closed),
            other => Err(Error::InvalidStatus(other)),
        }
    }
}

impl From<BreakerStatus> for i64 {
    fn from(status: BreakerStatus) -> Self {
        status as i64
    }
}

/// Current mode and when it was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerState {
    /// Current mode
    pub status: BreakerStatus,
    /// Time of the last transition
    pub updated_at: SystemTime,
}

/// Strategy producing a result when a call is short-circuited
pub trait Fallback<T, E>: Send + Sync {
    /// Substitute result for the skipped operation
    fn fallback(&self) -> Result<T, E>;
}

impl<T, E, F> Fallback<T, E> for F
where
    F: Fn() -> Result<T, E> + Send + Sync,
{
    fn fallback(&self) -> Result<T, E> {
        self()
    }
}

/// Default fallback: fails with [`CircuitOpenError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCircuitFallback;

impl<T, E> Fallback<T, E> for OpenCircuitFallback
where
    E: From<CircuitOpenError>,
{
    fn fallback(&self) -> Result<T, E> {
        Err(CircuitOpenError.into())
    }
}

/// Outcome of the per-call admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Run,
    ShortCircuit,
}

/// Circuit breaker guarding calls that return `Result<T, E>`
pub struct CircuitBreaker<T, E = Error> {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    health: Arc<dyn Health>,
    fallback: Arc<dyn Fallback<T, E>>,
    sink: Option<StateSender>,
    clock: Arc<dyn Clock>,
}

impl<T, E> fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<T, E> CircuitBreaker<T, E> {
    /// Start building a breaker from settings
    #[must_use]
    pub fn builder(settings: BreakerSettings) -> CircuitBreakerBuilder<T, E> {
        CircuitBreakerBuilder::new(settings)
    }

    /// Breaker with default health tracking, fallback and clock
    #[must_use]
    pub fn from_settings(settings: BreakerSettings) -> Self
    where
        E: From<CircuitOpenError>,
    {
        Self::builder(settings).build()
    }

    /// Run `operation` if the breaker admits it, otherwise the fallback
    ///
    /// The operation's result is returned untouched; an `Err` is recorded as
    /// an [`MetricKind::Error`] but never triggers the fallback.
    #[tracing::instrument(level = "trace", skip_all, fields(breaker = %self.name))]
    pub fn execute<F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let now = self.clock.now();
        if self.admit(now) == Admission::ShortCircuit {
            return self.short_circuit();
        }

        let result = operation();
        self.record_outcome(now, result.is_ok());
        result
    }

    /// [`execute`](Self::execute) with a cancellation token handed to the operation
    ///
    /// The breaker does not watch the token; honouring it is up to `operation`.
    pub fn execute_with_cancel<F>(&self, cancel: &CancellationToken, operation: F) -> Result<T, E>
    where
        F: FnOnce(&CancellationToken) -> Result<T, E>,
    {
        self.execute(|| operation(cancel))
    }

    /// Async counterpart of [`execute`](Self::execute)
    ///
    /// No lock is held while the operation future is pending.
    #[tracing::instrument(level = "trace", skip_all, fields(breaker = %self.name))]
    pub async fn execute_async<F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let now = self.clock.now();
        if self.admit(now) == Admission::ShortCircuit {
            return self.short_circuit();
        }

        let result = operation().await;
        self.record_outcome(now, result.is_ok());
        result
    }

    /// Current mode
    pub fn status(&self) -> BreakerStatus {
        self.state.lock().status
    }

    /// Current mode and when it was entered
    pub fn state(&self) -> BreakerState {
        *self.state.lock()
    }

    /// Force the breaker into `status`
    ///
    /// Accepts a [`BreakerStatus`] or a raw ordinal. Setting the current status
    /// again is a no-op and publishes nothing.
    pub fn set_status<S>(&self, status: S) -> crate::Result<()>
    where
        S: TryInto<BreakerStatus>,
        Error: From<S::Error>,
    {
        let status = status.try_into()?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.transition(&mut state, status, now);
        Ok(())
    }

    /// Record an outcome observed outside [`execute`](Self::execute)
    pub fn record_metric<K>(&self, timestamp: SystemTime, kind: K) -> crate::Result<()>
    where
        K: TryInto<MetricKind>,
        Error: From<K::Error>,
    {
        let kind = kind.try_into()?;
        self.health.add_metric(timestamp, kind)
    }

    /// Name used in logs and metric labels
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State machine configuration
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Health evaluator backing this breaker
    pub fn health(&self) -> &Arc<dyn Health> {
        &self.health
    }

    /// Human-readable status line
    pub fn status_message(&self) -> String {
        let state = self.state();
        match state.status {
            BreakerStatus::Closed => format!("Circuit breaker '{}' is closed", self.name),
            BreakerStatus::HalfOpen => {
                format!("Circuit breaker '{}' is half-open, testing recovery", self.name)
            }
            BreakerStatus::Open => {
                let elapsed = millis_between(state.updated_at, self.clock.now());
                let remaining = self.config.sleep_window_millis.saturating_sub(elapsed).max(0);
                format!(
                    "Circuit breaker '{}' is open, retry in {remaining} ms",
                    self.name
                )
            }
        }
    }

    fn admit(&self, now: SystemTime) -> Admission {
        let mut state = self.state.lock();

        if state.status == BreakerStatus::Open {
            if millis_between(state.updated_at, now) < self.config.sleep_window_millis {
                return Admission::ShortCircuit;
            }
            self.transition(&mut state, BreakerStatus::HalfOpen, now);
        }

        if state.status == BreakerStatus::Closed && !self.health.is_healthy(now) {
            self.transition(&mut state, BreakerStatus::Open, now);
            return Admission::ShortCircuit;
        }

        Admission::Run
    }

    fn short_circuit(&self) -> Result<T, E> {
        debug!(breaker = %self.name, "Circuit open, calling fallback");
        counter!("circuit_breaker_short_circuits_total", "breaker" => self.name.clone()).increment(1);
        self.fallback.fallback()
    }

    fn record_outcome(&self, now: SystemTime, ok: bool) {
        let kind = if ok { MetricKind::Success } else { MetricKind::Error };
        counter!(
            "circuit_breaker_calls_total",
            "breaker" => self.name.clone(),
            "outcome" => kind.as_str()
        )
        .increment(1);

        if let Err(e) = self.health.add_metric(now, kind) {
            debug!(breaker = %self.name, error = %e, "Failed to record call outcome");
        }
    }

    fn transition(&self, state: &mut BreakerState, to: BreakerStatus, now: SystemTime) {
        if state.status == to {
            return;
        }

        let from = state.status;
        state.status = to;
        state.updated_at = now;

        match to {
            BreakerStatus::Open => warn!(breaker = %self.name, %from, "Circuit breaker opened"),
            BreakerStatus::Closed => info!(breaker = %self.name, %from, "Circuit breaker closed"),
            BreakerStatus::HalfOpen => debug!(breaker = %self.name, %from, "Circuit breaker half-open"),
        }
        counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);

        if let Some(sink) = &self.sink {
            notify::publish(sink, *state);
        }
    }
}

/// Builder for [`CircuitBreaker`]
pub struct CircuitBreakerBuilder<T, E = Error> {
    settings: BreakerSettings,
    health: Option<Arc<dyn Health>>,
    predicate: Option<Arc<dyn HealthPredicate>>,
    sink: Option<StateSender>,
    clock: Option<Arc<dyn Clock>>,
    _result: std::marker::PhantomData<fn() -> Result<T, E>>,
}

impl<T, E> CircuitBreakerBuilder<T, E> {
    /// Start from settings
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            health: None,
            predicate: None,
            sink: None,
            clock: None,
            _result: std::marker::PhantomData,
        }
    }

    /// Use an existing health evaluator instead of a fresh [`HealthTracker`]
    #[must_use]
    pub fn health(mut self, health: Arc<dyn Health>) -> Self {
        self.health = Some(health);
        self
    }

    /// Predicate for the default [`HealthTracker`]; ignored when
    /// [`health`](Self::health) is set
    #[must_use]
    pub fn predicate(mut self, predicate: impl HealthPredicate + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Send a snapshot on every status change into a bounded channel
    ///
    /// Snapshots that do not fit are dropped.
    #[must_use]
    pub fn state_sink(mut self, sink: StateSender) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a fresh channel of [`DEFAULT_STATE_CHANNEL_CAPACITY`] and return
    /// its receiving half
    ///
    /// [`DEFAULT_STATE_CHANNEL_CAPACITY`]: super::DEFAULT_STATE_CHANNEL_CAPACITY
    #[must_use]
    pub fn subscribe(self) -> (Self, StateReceiver) {
        let (tx, rx) = notify::default_state_channel();
        (self.state_sink(tx), rx)
    }

    /// Time source, [`SystemClock`] by default
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build with the [`OpenCircuitFallback`]
    #[must_use]
    pub fn build(self) -> CircuitBreaker<T, E>
    where
        E: From<CircuitOpenError>,
    {
        self.build_with_fallback(OpenCircuitFallback)
    }

    /// Build with a custom fallback
    #[must_use]
    pub fn build_with_fallback(self, fallback: impl Fallback<T, E> + 'static) -> CircuitBreaker<T, E> {
        let health = self.health.unwrap_or_else(|| {
            let tracker = match self.predicate {
                Some(predicate) => HealthTracker::with_shared_predicate(self.settings.health, predicate),
                None => HealthTracker::new(self.settings.health),
            };
            Arc::new(tracker)
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let now = clock.now();

        CircuitBreaker {
            name: self.settings.name,
            config: self.settings.breaker,
            state: Mutex::new(BreakerState {
                status: BreakerStatus::Closed,
                updated_at: now,
            }),
            health,
            fallback: Arc::new(fallback),
            sink: self.sink,
            clock,
        }
    }
}
