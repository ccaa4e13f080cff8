//! Windowed health evaluation
//!
//! [`HealthTracker`] owns a [`MetricWindow`] and answers "is the guarded
//! dependency healthy right now". Every read first expires buckets that fell
//! out of the window, then hands the remaining counts to a
//! [`HealthPredicate`].
//!
//! The default predicate is [`FailureRatePredicate`]. With an empty window its
//! ratio is `0 / 0 = NaN`, and `NaN < threshold` is false, so a tracker that
//! has seen no traffic reports **unhealthy**.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;

use super::window::{MetricBucket, MetricKind, MetricSnapshot, MetricWindow};
use crate::Error;
use crate::clock::unix_seconds;
use crate::config::HealthConfig;

/// Health evaluation seam used by the circuit breaker
pub trait Health: Send + Sync {
    /// Verdict at `now`; may prune stale data as a side effect
    fn is_healthy(&self, now: SystemTime) -> bool;

    /// Record one call outcome at `timestamp`
    fn add_metric(&self, timestamp: SystemTime, kind: MetricKind) -> crate::Result<()>;
}

/// Strategy deciding health from the current window
pub trait HealthPredicate: Send + Sync {
    /// Return `true` when the counts describe a healthy dependency
    fn evaluate(&self, config: &HealthConfig, metrics: &MetricSnapshot<'_>) -> bool;
}

impl<F> HealthPredicate for F
where
    F: Fn(&HealthConfig, &MetricSnapshot<'_>) -> bool + Send + Sync,
{
    fn evaluate(&self, config: &HealthConfig, metrics: &MetricSnapshot<'_>) -> bool {
        self(config, metrics)
    }
}

/// Healthy while `(error + timeout) / total < error_rate_threshold`
///
/// Rejections count towards the total but not as failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureRatePredicate;

impl FailureRatePredicate {
    /// Failure ratio of a set of counts; NaN when there are none
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn failure_rate(totals: &MetricBucket) -> f64 {
        let successful = totals.success as f64 + totals.rejection as f64;
        let failed = totals.error as f64 + totals.timeout as f64;
        failed / (successful + failed)
    }
}

impl HealthPredicate for FailureRatePredicate {
    fn evaluate(&self, config: &HealthConfig, metrics: &MetricSnapshot<'_>) -> bool {
        Self::failure_rate(&metrics.totals()) < config.error_rate_threshold
    }
}

/// Summary of the window at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Verdict of the configured predicate
    pub healthy: bool,
    /// Number of one-second buckets still in the window
    pub buckets: usize,
    /// Oldest bucket key (Unix seconds)
    pub oldest: Option<i64>,
    /// Newest bucket key (Unix seconds)
    pub newest: Option<i64>,
    /// Counts summed over the window
    pub totals: MetricBucket,
    /// Default failure ratio; `None` when the window is empty
    pub failure_rate: Option<f64>,
}

/// Rolling-window health tracker
pub struct HealthTracker {
    config: HealthConfig,
    window: Mutex<MetricWindow>,
    predicate: Arc<dyn HealthPredicate>,
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("config", &self.config)
            .field("buckets", &self.window.lock().len())
            .finish_non_exhaustive()
    }
}

impl HealthTracker {
    /// Create a tracker using [`FailureRatePredicate`]
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self::with_predicate(config, FailureRatePredicate)
    }

    /// Create a tracker with a custom predicate
    #[must_use]
    pub fn with_predicate(config: HealthConfig, predicate: impl HealthPredicate + 'static) -> Self {
        Self::with_shared_predicate(config, Arc::new(predicate))
    }

    /// Create a tracker with a predicate shared with other trackers
    #[must_use]
    pub fn with_shared_predicate(config: HealthConfig, predicate: Arc<dyn HealthPredicate>) -> Self {
        Self {
            config,
            window: Mutex::new(MetricWindow::new()),
            predicate,
        }
    }

    /// Window configuration
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Record an outcome given as a [`MetricKind`] or a raw ordinal
    pub fn record<K>(&self, timestamp: SystemTime, kind: K) -> crate::Result<()>
    where
        K: TryInto<MetricKind>,
        Error: From<K::Error>,
    {
        self.window.lock().insert(unix_seconds(timestamp), kind)
    }

    /// Prune the window at `now` and evaluate the predicate
    pub fn check(&self, now: SystemTime) -> bool {
        let mut window = self.window.lock();
        window.evict_older_than(self.cutoff(now));
        self.predicate.evaluate(&self.config, &window.snapshot())
    }

    /// Prune the window at `now` and summarize what is left
    pub fn report(&self, now: SystemTime) -> HealthReport {
        let mut window = self.window.lock();
        window.evict_older_than(self.cutoff(now));

        let snapshot = window.snapshot();
        let totals = snapshot.totals();
        HealthReport {
            healthy: self.predicate.evaluate(&self.config, &snapshot),
            buckets: snapshot.keys().len(),
            oldest: snapshot.keys().first().copied(),
            newest: snapshot.keys().last().copied(),
            totals,
            failure_rate: (!snapshot.is_empty()).then(|| FailureRatePredicate::failure_rate(&totals)),
        }
    }

    /// Forget all recorded outcomes
    pub fn reset(&self) {
        self.window.lock().clear();
        tracing::debug!("Health window reset");
    }

    fn cutoff(&self, now: SystemTime) -> i64 {
        unix_seconds(now).saturating_sub(self.config.window_size_seconds)
    }
}

impl Health for HealthTracker {
    fn is_healthy(&self, now: SystemTime) -> bool {
        self.check(now)
    }

    fn add_metric(&self, timestamp: SystemTime, kind: MetricKind) -> crate::Result<()> {
        self.record(timestamp, kind)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use pretty_assertions::assert_eq;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn config(window_size_seconds: i64, error_rate_threshold: f64) -> HealthConfig {
        HealthConfig {
            window_size_seconds,
            error_rate_threshold,
        }
    }

    fn record_n(tracker: &HealthTracker, secs: u64, kind: MetricKind, n: usize) {
        for _ in 0..n {
            tracker.record(at(secs), kind).unwrap();
        }
    }

    #[test]
    fn test_empty_window_is_unhealthy() {
        let tracker = HealthTracker::new(config(10, 0.5));
        assert!(!tracker.is_healthy(at(1_000)));

        // Even a threshold of 1.0 cannot make NaN healthy
        let tracker = HealthTracker::new(config(10, 1.0));
        assert!(!tracker.is_healthy(at(1_000)));
    }

    #[test]
    fn test_low_error_rate_is_healthy() {
        let tracker = HealthTracker::new(config(1_000_000, 0.1));
        record_n(&tracker, 930_000_000, MetricKind::Success, 100);
        record_n(&tracker, 930_000_001, MetricKind::Error, 1);

        assert!(tracker.is_healthy(at(930_000_002)));
    }

    #[test]
    fn test_rate_equal_to_threshold_is_unhealthy() {
        let tracker = HealthTracker::new(config(1_000_000, 0.5));
        record_n(&tracker, 930_000_000, MetricKind::Success, 5);
        record_n(&tracker, 930_000_000, MetricKind::Error, 2);
        record_n(&tracker, 930_000_001, MetricKind::Success, 2);
        record_n(&tracker, 930_000_001, MetricKind::Error, 5);

        assert!(!tracker.is_healthy(at(930_000_002)));
    }

    #[test]
    fn test_timeouts_fail_rejections_pass() {
        let tracker = HealthTracker::new(config(60, 0.5));
        record_n(&tracker, 100, MetricKind::Timeout, 2);
        record_n(&tracker, 100, MetricKind::Rejection, 3);
        // 2 / 5 = 0.4
        assert!(tracker.is_healthy(at(101)));

        record_n(&tracker, 101, MetricKind::Timeout, 1);
        // 3 / 6 = 0.5
        assert!(!tracker.is_healthy(at(101)));
    }

    #[test]
    fn test_health_read_expires_old_buckets() {
        let tracker = HealthTracker::new(config(10, 0.5));
        record_n(&tracker, 100, MetricKind::Error, 10);
        record_n(&tracker, 105, MetricKind::Success, 1);
        assert!(!tracker.is_healthy(at(109)));

        // Cutoff 100: the error bucket at exactly the cutoff is expired
        assert!(tracker.is_healthy(at(110)));
        assert_eq!(tracker.report(at(110)).buckets, 1);

        // Everything expired: back to the empty-window verdict
        assert!(!tracker.is_healthy(at(115)));
        assert_eq!(tracker.report(at(115)).buckets, 0);
    }

    #[test]
    fn test_record_invalid_ordinal() {
        let tracker = HealthTracker::new(config(10, 0.5));
        record_n(&tracker, 100, MetricKind::Success, 1);
        let before = tracker.report(at(100));

        assert_eq!(tracker.record(at(100), 42_i64), Err(Error::InvalidMetricKind(42)));
        assert_eq!(tracker.report(at(100)), before);
    }

    #[test]
    fn test_record_accepts_kind_or_ordinal() {
        let tracker = HealthTracker::new(config(10, 0.5));
        tracker.record(at(100), MetricKind::Error).unwrap();
        tracker.record(at(100), 3_i64).unwrap();
        tracker.record(at(101), 1_i64).unwrap();

        let totals = tracker.report(at(101)).totals;
        assert_eq!(totals.error, 1);
        assert_eq!(totals.timeout, 1);
        assert_eq!(totals.success, 1);
    }

    #[test]
    fn test_custom_predicate() {
        fn no_rejections(_: &HealthConfig, metrics: &MetricSnapshot<'_>) -> bool {
            metrics.totals().rejection == 0
        }

        let tracker = HealthTracker::with_predicate(config(10, 0.5), no_rejections);
        // Empty window: custom predicate decides
        assert!(tracker.is_healthy(at(100)));

        record_n(&tracker, 100, MetricKind::Rejection, 1);
        assert!(!tracker.is_healthy(at(100)));
    }

    #[test]
    fn test_report() {
        let tracker = HealthTracker::new(config(10, 0.5));
        record_n(&tracker, 100, MetricKind::Success, 3);
        record_n(&tracker, 102, MetricKind::Error, 1);

        let report = tracker.report(at(105));
        assert_eq!(
            report,
            HealthReport {
                healthy: true,
                buckets: 2,
                oldest: Some(100),
                newest: Some(102),
                totals: MetricBucket {
                    success: 3,
                    error: 1,
                    timeout: 0,
                    rejection: 0,
                },
                failure_rate: Some(0.25),
            }
        );

        tracker.reset();
        let report = tracker.report(at(105));
        assert!(!report.healthy);
        assert_eq!(report.failure_rate, None);
    }
}
