//! Prometheus metrics for the engine.
//!
//! This module provides:
//! - Order submission and tick latency histograms
//! - WebSocket message counters and latency
//! - Decision, order, escalation and settlement counters

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Engine tick latency metric name.
pub const METRIC_TICK_LATENCY: &str = "tick_latency_ms";
/// Decisions counter metric name, labelled by kind.
pub const METRIC_DECISIONS: &str = "decisions_total";
/// Orders submitted counter metric name.
pub const METRIC_ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Orders filled counter metric name.
pub const METRIC_ORDERS_FILLED: &str = "orders_filled_total";
/// Orders failed counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Orders canceled counter metric name.
pub const METRIC_ORDERS_CANCELED: &str = "orders_canceled_total";
/// Rebalances counter metric name.
pub const METRIC_REBALANCES: &str = "rebalances_total";
/// Forced pairings counter metric name.
pub const METRIC_FORCED_PAIRINGS: &str = "forced_pairings_total";
/// Settlements counter metric name.
pub const METRIC_SETTLEMENTS: &str = "settlements_total";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";

/// Register metric descriptions. Call once at startup.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds"
    );
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(METRIC_TICK_LATENCY, "Engine tick duration in milliseconds");

    describe_counter!(METRIC_DECISIONS, "Decisions taken, by kind");
    describe_counter!(METRIC_ORDERS_SUBMITTED, "Total number of orders submitted");
    describe_counter!(METRIC_ORDERS_FILLED, "Total number of fills observed");
    describe_counter!(METRIC_ORDERS_FAILED, "Total number of orders that failed");
    describe_counter!(METRIC_ORDERS_CANCELED, "Total number of orders canceled");
    describe_counter!(METRIC_REBALANCES, "Rebalance escalations executed");
    describe_counter!(
        METRIC_FORCED_PAIRINGS,
        "Pairing fills accepted above the ceiling"
    );
    describe_counter!(METRIC_SETTLEMENTS, "Instruments settled");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received"
    );
    describe_counter!(
        METRIC_WS_RECONNECTS,
        "Total number of WebSocket reconnections"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder; the handle renders `/metrics`.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Record order submission latency.
pub fn record_order_latency(start: Instant) {
    histogram!(METRIC_ORDER_SUBMIT_LATENCY).record(elapsed_ms(start));
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(elapsed_ms(start));
}

/// Record one engine tick.
pub fn record_tick_latency(start: Instant) {
    histogram!(METRIC_TICK_LATENCY).record(elapsed_ms(start));
}

/// Count a decision by kind label.
pub fn inc_decisions(kind: &str) {
    counter!(METRIC_DECISIONS, "kind" => kind.to_string()).increment(1);
}

/// Increment order submitted counter.
pub fn inc_orders_submitted() {
    counter!(METRIC_ORDERS_SUBMITTED).increment(1);
}

/// Increment orders filled counter.
pub fn inc_orders_filled() {
    counter!(METRIC_ORDERS_FILLED).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed() {
    counter!(METRIC_ORDERS_FAILED).increment(1);
}

/// Increment orders canceled counter.
pub fn inc_orders_canceled() {
    counter!(METRIC_ORDERS_CANCELED).increment(1);
}

/// Increment rebalance counter.
pub fn inc_rebalances() {
    counter!(METRIC_REBALANCES).increment(1);
}

/// Increment forced pairing counter.
pub fn inc_forced_pairings() {
    counter!(METRIC_FORCED_PAIRINGS).increment(1);
}

/// Increment settlement counter.
pub fn inc_settlements() {
    counter!(METRIC_SETTLEMENTS).increment(1);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn counters_render_through_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            init_metrics();
            inc_decisions("take_take");
            inc_decisions("take_take");
            inc_settlements();
        });

        let rendered = handle.render();
        assert!(rendered.contains("decisions_total{kind=\"take_take\"} 2"));
        assert!(rendered.contains("settlements_total 1"));
    }
}
