//! Breaker metrics
//!
//! Counters are emitted through the `metrics` facade and go nowhere until a
//! recorder is installed:
//! - `circuit_breaker_transitions_total{breaker,to}` - status changes
//! - `circuit_breaker_short_circuits_total{breaker}` - calls answered by the fallback
//! - `circuit_breaker_calls_total{breaker,outcome}` - operations run, by outcome

use telemetry_metrics::describe_counter;

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "circuit_breaker_transitions_total",
        "Total circuit breaker status transitions"
    );
    describe_counter!(
        "circuit_breaker_short_circuits_total",
        "Total calls short-circuited to the fallback"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total guarded operations executed, by outcome"
    );
}

/// Install a Prometheus recorder and describe the breaker metrics
///
/// Returns the handle used to render the scrape output.
#[cfg(feature = "metrics")]
pub fn install_prometheus_recorder() -> crate::Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::Error::Config(format!("Failed to install Prometheus recorder: {e}")))?;
    describe_metrics();
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_metrics();
        describe_metrics();
    }
}
