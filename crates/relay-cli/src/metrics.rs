//! Metrics export for the Relay demo.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::RouterStats;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_PUBLISHED: &str = "relay_messages_published_total";
    pub const MESSAGES_RECEIVED: &str = "relay_messages_received_total";
    pub const MESSAGES_UNROUTED: &str = "relay_messages_unrouted_total";
    pub const MESSAGES_DROPPED: &str = "relay_messages_dropped_total";
    pub const DELIVERIES_DISPATCHED: &str = "relay_deliveries_dispatched_total";
    pub const TOPICS_ACTIVE: &str = "relay_topics_active";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "relay_subscriptions_active";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::MESSAGES_PUBLISHED, "Total number of publish calls");
    metrics::describe_counter!(
        names::MESSAGES_RECEIVED,
        "Total number of messages taken off subscription queues"
    );
    metrics::describe_counter!(
        names::MESSAGES_UNROUTED,
        "Messages dropped because their topic had no subscribers"
    );
    metrics::describe_counter!(
        names::MESSAGES_DROPPED,
        "Deliveries dropped because a subscription queue was full"
    );
    metrics::describe_counter!(
        names::DELIVERIES_DISPATCHED,
        "Total per-subscriber deliveries dispatched"
    );
    metrics::describe_gauge!(names::TOPICS_ACTIVE, "Current number of topics with subscribers");
    metrics::describe_gauge!(
        names::SUBSCRIPTIONS_ACTIVE,
        "Current number of live subscriptions"
    );

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

/// Record a message received by a demo subscriber.
pub fn record_received(topic: &str) {
    counter!(names::MESSAGES_RECEIVED, "topic" => topic.to_string()).increment(1);
}

/// Mirror router statistics into the exported metrics.
pub fn record_stats(stats: &RouterStats) {
    counter!(names::MESSAGES_PUBLISHED).absolute(stats.messages_published);
    counter!(names::MESSAGES_UNROUTED).absolute(stats.messages_unrouted);
    counter!(names::MESSAGES_DROPPED).absolute(stats.messages_dropped);
    counter!(names::DELIVERIES_DISPATCHED).absolute(stats.deliveries_dispatched);
    gauge!(names::TOPICS_ACTIVE).set(stats.topic_count as f64);
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(stats.subscription_count as f64);
}
