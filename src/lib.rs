//! Circuit breaker library
//!
//! Guards a fallible operation (typically a remote call) and decides, per call,
//! whether to run it, short-circuit it to a fallback, or let a probe through.
//!
//! # Features
//!
//! - **Windowed health**: outcomes bucketed per second, expired on every read
//! - **Pluggable strategies**: health predicate and fallback are traits; state
//!   changes go to a bounded channel
//! - **Thread-safe**: one lock per breaker decision, one per metric window
//! - **Observable**: `tracing` events on transitions, `metrics` counters per call
//!
//! # Example
//!
//! ```
//! use circuitbreaker::config::BreakerSettings;
//! use circuitbreaker::failsafe::CircuitBreaker;
//!
//! let breaker: CircuitBreaker<u32> = CircuitBreaker::from_settings(BreakerSettings::default());
//! // A window with no outcomes yet is unhealthy, so the first call opens the circuit.
//! assert!(breaker.execute(|| Ok(1)).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod telemetry;

pub use error::{CircuitOpenError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` of `Some("json")` selects
/// JSON output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}"))),
    }
}
