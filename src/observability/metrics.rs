//! Metrics collection and exposition.
//!
//! # Metrics
//! - `capture_requests_total` (counter): exchanges seen, by method (`other` for extensions)
//! - `capture_export_enqueued_total` (counter): jobs accepted by the queue
//! - `capture_export_dropped_total` (counter): jobs discarded, by reason
//! - `capture_export_delivered_total` (counter): collector calls that got a response
//! - `capture_export_failed_total` (counter): collector calls that failed in transport
//! - `capture_export_requeued_total` (counter): failed jobs given their one retry
//! - `capture_export_duration_seconds` (histogram): collector call latency
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Serve Prometheus metrics on `addr`. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_capture(method: &str) {
    counter!("capture_requests_total", "method" => method_label(method)).increment(1);
}

/// Standard methods label as themselves; anything else is `other`.
fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "HEAD" => "HEAD",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "CONNECT" => "CONNECT",
        "OPTIONS" => "OPTIONS",
        "TRACE" => "TRACE",
        "PATCH" => "PATCH",
        _ => "other",
    }
}

pub fn record_export_enqueued() {
    counter!("capture_export_enqueued_total").increment(1);
}

pub fn record_export_dropped(reason: &'static str) {
    counter!("capture_export_dropped_total", "reason" => reason).increment(1);
}

pub fn record_export_delivered(started: Instant) {
    counter!("capture_export_delivered_total").increment(1);
    histogram!("capture_export_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_export_failed() {
    counter!("capture_export_failed_total").increment(1);
}

pub fn record_export_requeued() {
    counter!("capture_export_requeued_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_label_is_bounded() {
        assert_eq!(method_label("GET"), "GET");
        assert_eq!(method_label("PATCH"), "PATCH");
        assert_eq!(method_label("PROPFIND"), "other");
        assert_eq!(method_label("get"), "other");
        assert_eq!(method_label("X-RANDOM-12345"), "other");
    }
}
