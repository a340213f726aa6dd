//! Metrics collection and export for liveframe.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "liveframe_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "liveframe_connections_active";
    pub const MESSAGES_TOTAL: &str = "liveframe_messages_total";
    pub const MESSAGES_BYTES: &str = "liveframe_messages_bytes";
    pub const TOPICS_ACTIVE: &str = "liveframe_topics_active";
    pub const JOINS_TOTAL: &str = "liveframe_joins_total";
    pub const DISPATCH_SECONDS: &str = "liveframe_dispatch_seconds";
    pub const ERRORS_TOTAL: &str = "liveframe_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages processed");
    metrics::describe_gauge!(names::TOPICS_ACTIVE, "Current number of joined topics");
    metrics::describe_counter!(names::JOINS_TOTAL, "Total number of topic joins");
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Inbound message dispatch latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record dispatch latency.
pub fn record_dispatch(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Record joined topics changing on one connection.
pub fn record_topics(before: usize, after: usize) {
    gauge!(names::TOPICS_ACTIVE).increment(after as f64 - before as f64);
}

/// Record a join that mounted a session.
pub fn record_join() {
    counter!(names::JOINS_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
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
        record_disconnection();
    }
}
