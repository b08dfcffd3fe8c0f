//! Metrics collection and exposition.
//!
//! # Metrics
//! - `<prefix>_rpc_requests_total` (counter): calls by method, status code
//! - `<prefix>_rpc_latency_seconds` (histogram): call latency by method
//! - `quota_acquired_tokens_total` / `quota_returned_tokens_total` (counter)
//! - `quota_dry_run_rejections_total` (counter): would-be rejections by method
//! - `deleted_tree_gc_success_total` (counter): trees hard-deleted
//! - `deleted_tree_gc_failure_total` (counter): failed hard deletes by reason
//! - `announce_lease_lost_total` (counter): involuntary lease losses

use std::sync::OnceLock;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the process-wide Prometheus recorder, returning a render handle.
///
/// Subsequent calls return the same handle. If another recorder is already
/// installed, the returned handle renders an empty registry.
pub fn install() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

pub fn record_rpc(prefix: &str, method: &str, code: &str, start: Instant) {
    let latency = start.elapsed().as_secs_f64();
    metrics::counter!(
        format!("{prefix}_rpc_requests_total"),
        "method" => method.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
    metrics::histogram!(
        format!("{prefix}_rpc_latency_seconds"),
        "method" => method.to_string()
    )
    .record(latency);
}

pub fn record_quota_acquired(tokens: u32) {
    metrics::counter!("quota_acquired_tokens_total").increment(u64::from(tokens));
}

pub fn record_quota_returned(tokens: u32) {
    metrics::counter!("quota_returned_tokens_total").increment(u64::from(tokens));
}

pub fn record_quota_dry_run_rejection(method: &str) {
    metrics::counter!("quota_dry_run_rejections_total", "method" => method.to_string())
        .increment(1);
}

pub fn record_tree_gc_success(count: u64) {
    metrics::counter!("deleted_tree_gc_success_total").increment(count);
}

pub fn record_tree_gc_failure(reason: &'static str) {
    metrics::counter!("deleted_tree_gc_failure_total", "reason" => reason).increment(1);
}

pub fn record_lease_lost(service: &str) {
    metrics::counter!("announce_lease_lost_total", "service" => service.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let _first = install();
        record_tree_gc_failure("hard_delete");
        let second = install();
        assert!(second.render().contains("deleted_tree_gc_failure_total"));
    }
}
