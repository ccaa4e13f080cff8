//! State change notifications
//!
//! Publishing never blocks the call path. Snapshots go into a bounded tokio
//! channel with `try_send`: when the consumer lags or is gone, the snapshot is
//! dropped instead of queueing without limit. No consumer code runs on the
//! publishing thread.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use super::circuit_breaker::BreakerState;

/// Capacity used by [`default_state_channel`] and
/// [`CircuitBreakerBuilder::subscribe`](super::CircuitBreakerBuilder::subscribe)
pub const DEFAULT_STATE_CHANNEL_CAPACITY: usize = 64;

/// Sending half handed to a breaker
pub type StateSender = mpsc::Sender<BreakerState>;

/// Receiving half held by the consumer
pub type StateReceiver = mpsc::Receiver<BreakerState>;

/// Bounded channel suitable as a breaker's state sink
#[must_use]
pub fn state_channel(capacity: usize) -> (StateSender, StateReceiver) {
    mpsc::channel(capacity.max(1))
}

/// [`state_channel`] with [`DEFAULT_STATE_CHANNEL_CAPACITY`]
#[must_use]
pub fn default_state_channel() -> (StateSender, StateReceiver) {
    state_channel(DEFAULT_STATE_CHANNEL_CAPACITY)
}

pub(crate) fn publish(tx: &StateSender, state: BreakerState) {
    match tx.try_send(state) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            debug!(status = %dropped.status, "State channel full, dropping notification");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("State channel closed, dropping notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::failsafe::BreakerStatus;

    fn state(status: BreakerStatus, secs: u64) -> BreakerState {
        BreakerState {
            status,
            updated_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (tx, mut rx) = state_channel(4);
        publish(&tx, state(BreakerStatus::Open, 1));
        publish(&tx, state(BreakerStatus::HalfOpen, 2));

        assert_eq!(rx.recv().await, Some(state(BreakerStatus::Open, 1)));
        assert_eq!(rx.recv().await, Some(state(BreakerStatus::HalfOpen, 2)));
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (tx, mut rx) = state_channel(1);
        publish(&tx, state(BreakerStatus::Open, 1));
        publish(&tx, state(BreakerStatus::HalfOpen, 2));
        drop(tx);

        assert_eq!(rx.recv().await, Some(state(BreakerStatus::Open, 1)));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_default_channel_capacity() {
        let (tx, _rx) = default_state_channel();
        assert_eq!(tx.max_capacity(), DEFAULT_STATE_CHANNEL_CAPACITY);

        let (tx, _rx) = state_channel(0);
        assert_eq!(tx.max_capacity(), 1);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = state_channel(1);
        drop(rx);
        publish(&tx, state(BreakerStatus::Closed, 3));
    }
}
