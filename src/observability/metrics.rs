//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by route, method, status
//! - `proxy_request_duration_seconds` (histogram): latency by route
//! - `proxy_auth_decisions_total` (counter): decisions by auth mode and outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is optional and off by default

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!("proxy_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record an authorization decision.
pub fn record_auth_decision(mode: &'static str, outcome: &'static str) {
    metrics::counter!("proxy_auth_decisions_total", "mode" => mode, "outcome" => outcome).increment(1);
}
