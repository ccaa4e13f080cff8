//! Error types for the circuit breaker

use std::convert::Infallible;
use std::fmt;

use thiserror::Error;

/// Result type alias for the circuit breaker
pub type Result<T> = std::result::Result<T, Error>;

/// Marker returned by the default fallback when the circuit is open.
///
/// Kept separate from [`Error`] so callers with their own error type can
/// implement `From<CircuitOpenError>` and still use the default fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircuitOpenError;

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("circuit is open")
    }
}

impl std::error::Error for CircuitOpenError {}

/// Circuit breaker errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Metric kind ordinal outside 1..=4
    #[error("invalid metric kind: {0}")]
    InvalidMetricKind(i64),

    /// Breaker status ordinal outside 1..=3
    #[error("invalid status: {0}")]
    InvalidStatus(i64),

    /// Breaker declined to run the operation
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the default fallback of an open circuit
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

// Lets typed values flow through the same `TryInto` bounds as raw ordinals.
impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
