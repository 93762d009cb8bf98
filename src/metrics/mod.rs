//! Prometheus metrics for queue operations: `lazy_static`-registered
//! counters and gauges covering message throughput, assignment outcomes,
//! auth rejections, and backend health.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

const METRIC_PREFIX: &str = "multiqueue";

lazy_static! {
    /// Messages successfully added, by sub-queue.
    pub static ref MESSAGES_ADDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_added_total", METRIC_PREFIX),
        "Total messages added to a sub-queue",
        &["sub_queue"]
    )
    .unwrap();

    /// Rejected `add` attempts due to a uuid collision.
    pub static ref DUPLICATE_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_duplicate_rejected_total", METRIC_PREFIX),
        "Total add() calls rejected for a duplicate uuid"
    )
    .unwrap();

    /// Successful polls (head removed), by sub-queue.
    pub static ref POLLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_polls_total", METRIC_PREFIX),
        "Total poll() calls that returned a message",
        &["sub_queue"]
    )
    .unwrap();

    /// Assignment attempts, partitioned by outcome.
    pub static ref ASSIGNMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_assignments_total", METRIC_PREFIX),
        "Total assign() calls by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Requests rejected by the access-control filter, by reason.
    pub static ref AUTH_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_auth_rejected_total", METRIC_PREFIX),
        "Total requests rejected by the access-control filter",
        &["reason"]
    )
    .unwrap();

    /// Whether the storage backend last answered a health probe (1) or
    /// not (0).
    pub static ref BACKEND_UP: IntGauge = register_int_gauge!(
        format!("{}_backend_up", METRIC_PREFIX),
        "Whether the last backend health probe succeeded"
    )
    .unwrap();
}

/// Render the process's metric registry in the Prometheus text exposition
/// format, for the `/metrics` endpoint.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_metrics_includes_registered_families() {
        MESSAGES_ADDED_TOTAL.with_label_values(&["orders"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("multiqueue_messages_added_total"));
    }
}
