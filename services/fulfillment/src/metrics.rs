//! Prometheus metrics exposition
//!
//! Registers and exposes the fulfillment metrics:
//!
//! - `fulfillments_total` (counter): label `outcome`
//! - `fulfillment_duration_seconds` (histogram): label `outcome`
//!
//! The pool crate additionally emits `slot_assignments_total` and
//! `slot_releases_total` per call; they render through the same recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `fulfillment_duration_seconds` with explicit buckets so it
/// renders as a Prometheus histogram (with `_bucket` lines for
/// `histogram_quantile()` queries) rather than the default summary.
/// Allocation is local store work plus two fsyncs, so the buckets span
/// 1ms to 2.5s.
///
/// The handle's `render()` method produces the Prometheus text exposition
/// format suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "fulfillment_duration_seconds".to_string(),
            ),
            &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed fulfillment attempt with its outcome label.
pub fn record_fulfillment(outcome: &str, duration_secs: f64) {
    metrics::counter!("fulfillments_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("fulfillment_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
