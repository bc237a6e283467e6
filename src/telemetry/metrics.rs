//! Prometheus metrics

use crate::connection::ConnectionState;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Tick batches delivered through the bus
    TickBatchesPublished,
    /// Alerts delivered through the bus
    AlertsPublished,
    /// Notifications handed to the platform
    NotificationsShown,
    /// Notifications dropped by the dedup window
    NotificationsSuppressed,
    /// Connection state transitions
    StateTransitions,
    /// Automatic reconnect attempts started
    ReconnectAttempts,
    /// REST calls answered with 401
    Unauthorized,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::TickBatchesPublished => "livequotes_tick_batches_total",
            CounterMetric::AlertsPublished => "livequotes_alerts_total",
            CounterMetric::NotificationsShown => "livequotes_notifications_shown_total",
            CounterMetric::NotificationsSuppressed => "livequotes_notifications_suppressed_total",
            CounterMetric::StateTransitions => "livequotes_state_transitions_total",
            CounterMetric::ReconnectAttempts => "livequotes_reconnect_attempts_total",
            CounterMetric::Unauthorized => "livequotes_unauthorized_total",
        }
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Record the current connection state as a gauge
pub fn record_state(state: ConnectionState) {
    metrics::gauge!("livequotes_connection_state").set(state.ordinal() as f64);
    metrics::counter!(CounterMetric::StateTransitions.name(), "state" => state.as_str())
        .increment(1);
}
