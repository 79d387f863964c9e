//! Prometheus metrics for the fan-out hub.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Metric names for the hub.
pub mod names {
    /// Currently connected clients.
    pub const HUB_CONNECTIONS: &str = "adpulse_hub_connections";
    /// Currently subscribed topics.
    pub const HUB_TOPICS: &str = "adpulse_hub_topics";
    /// Events delivered to connections.
    pub const HUB_DELIVERIES_TOTAL: &str = "adpulse_hub_deliveries_total";
    /// Broadcasts that reached no connection.
    pub const HUB_UNDELIVERED_TOTAL: &str = "adpulse_hub_undelivered_total";
}

/// Register hub metric descriptions.
pub fn register_metrics() {
    describe_gauge!(names::HUB_CONNECTIONS, "Number of connected hub clients");
    describe_gauge!(names::HUB_TOPICS, "Number of job topics with at least one subscriber");
    describe_counter!(
        names::HUB_DELIVERIES_TOTAL,
        "Total number of events delivered to hub connections"
    );
    describe_counter!(
        names::HUB_UNDELIVERED_TOTAL,
        "Total number of broadcasts with no subscriber"
    );
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn record_sizes(connections: usize, topics: usize) {
    gauge!(names::HUB_CONNECTIONS).set(connections as f64);
    gauge!(names::HUB_TOPICS).set(topics as f64);
}

pub(crate) fn record_broadcast(event: &'static str, delivered: usize) {
    if delivered == 0 {
        counter!(names::HUB_UNDELIVERED_TOTAL, "event" => event).increment(1);
    } else {
        counter!(names::HUB_DELIVERIES_TOTAL, "event" => event).increment(delivered as u64);
    }
}
