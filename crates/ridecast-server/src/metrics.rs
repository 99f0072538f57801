//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports to Prometheus
//! format. Without an installed recorder every call is a no-op.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const DISPATCH_TOTAL: &str = "ridecast_dispatch_total";
    pub const RELAY_TOTAL: &str = "ridecast_relay_total";
    pub const VALIDATION_FAILURES_TOTAL: &str = "ridecast_validation_failures_total";
    pub const CONNECTIONS_TOTAL: &str = "ridecast_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "ridecast_connections_active";
    pub const CHANNELS_ACTIVE: &str = "ridecast_channels_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "ridecast_subscriptions_total";
}

/// Describe all metrics.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::DISPATCH_TOTAL,
        "Envelope dispatches by event and outcome"
    );
    metrics::describe_counter!(
        names::RELAY_TOTAL,
        "System-of-record calls by operation and outcome"
    );
    metrics::describe_counter!(
        names::VALIDATION_FAILURES_TOTAL,
        "Requests rejected with 422 by endpoint"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Subscriber connections since server start"
    );
    metrics::describe_gauge!(names::CONNECTIONS_ACTIVE, "Open subscriber connections");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Live channels in the local broker");
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Accepted channel subscriptions");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_dispatch(event: &'static str, ok: bool) {
    let outcome = if ok { "accepted" } else { "failed" };
    counter!(names::DISPATCH_TOTAL, "event" => event, "outcome" => outcome).increment(1);
}

pub fn record_relay(operation: &'static str, ok: bool) {
    let outcome = if ok { "persisted" } else { "failed" };
    counter!(names::RELAY_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

pub fn record_validation_failure(endpoint: &str) {
    counter!(names::VALIDATION_FAILURES_TOTAL, "endpoint" => endpoint.to_owned()).increment(1);
}

pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Counts a subscriber connection for as long as it lives.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
