//! Prometheus metrics for the decision loop and its collaborators.
//!
//! This module provides metrics for:
//! - Decision cycles and the action each one took
//! - Price fetch latency and failures
//! - Order submission latency and outcomes
//! - Reconciliation alarms and trade log failures

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

// === Metric Name Constants ===

/// Price fetch latency metric name.
pub const PRICE_FETCH_LATENCY_MS: &str = "price_fetch_latency_ms";
/// Order submission (submit + fill confirmation) latency metric name.
pub const ORDER_SUBMIT_LATENCY_MS: &str = "order_submit_latency_ms";
/// HTTP request latency metric name.
pub const HTTP_REQUEST_LATENCY_MS: &str = "http_request_latency_ms";
/// Decision cycles counter metric name.
pub const CYCLES_TOTAL: &str = "cycles_total";
/// Decisions counter, labelled by action.
pub const DECISIONS_TOTAL: &str = "decisions_total";
/// Failed price fetches counter metric name.
pub const PRICE_FETCH_FAILURES_TOTAL: &str = "price_fetch_failures_total";
/// Orders submitted counter metric name.
pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
/// Orders filled counter metric name.
pub const ORDERS_FILLED_TOTAL: &str = "orders_filled_total";
/// Orders failed counter metric name.
pub const ORDERS_FAILED_TOTAL: &str = "orders_failed_total";
/// Reconciliation alarms counter metric name.
pub const RECONCILIATION_ALARMS_TOTAL: &str = "reconciliation_alarms_total";
/// Trade log write failures counter metric name.
pub const RECORDER_FAILURES_TOTAL: &str = "recorder_failures_total";
/// Last observed price gauge.
pub const LAST_PRICE: &str = "last_price";
/// Rolling median gauge.
pub const ROLLING_MEDIAN: &str = "rolling_median";
/// Cumulative realized P&L gauge.
pub const REALIZED_PNL: &str = "realized_pnl";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(PRICE_FETCH_LATENCY_MS, "Price fetch latency in milliseconds");
    describe_histogram!(
        ORDER_SUBMIT_LATENCY_MS,
        "Order submission and fill confirmation latency in milliseconds"
    );
    describe_histogram!(HTTP_REQUEST_LATENCY_MS, "HTTP request latency in milliseconds");

    describe_counter!(CYCLES_TOTAL, "Total number of decision cycles run");
    describe_counter!(DECISIONS_TOTAL, "Total number of decisions by action");
    describe_counter!(PRICE_FETCH_FAILURES_TOTAL, "Total number of failed price fetches");
    describe_counter!(ORDERS_SUBMITTED_TOTAL, "Total number of orders submitted");
    describe_counter!(ORDERS_FILLED_TOTAL, "Total number of orders filled");
    describe_counter!(ORDERS_FAILED_TOTAL, "Total number of orders that did not fill");
    describe_counter!(
        RECONCILIATION_ALARMS_TOTAL,
        "Total number of local/exchange position mismatches"
    );
    describe_counter!(RECORDER_FAILURES_TOTAL, "Total number of trade log write failures");

    describe_gauge!(LAST_PRICE, "Last observed price");
    describe_gauge!(ROLLING_MEDIAN, "Rolling median price");
    describe_gauge!(REALIZED_PNL, "Cumulative realized P&L for the session");

    debug!("Metrics initialized");
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(HTTP_REQUEST_LATENCY_MS, "endpoint" => endpoint).record(latency_ms);
}

/// Increment the cycle counter.
pub fn inc_cycles() {
    counter!(CYCLES_TOTAL).increment(1);
}

/// Count a decision by its action label.
pub fn inc_decision(action: &str) {
    counter!(DECISIONS_TOTAL, "action" => action.to_string()).increment(1);
}

/// Increment failed price fetches.
pub fn inc_price_fetch_failures() {
    counter!(PRICE_FETCH_FAILURES_TOTAL).increment(1);
}

/// Increment order submitted counter.
pub fn inc_orders_submitted() {
    counter!(ORDERS_SUBMITTED_TOTAL).increment(1);
}

/// Increment orders filled counter.
pub fn inc_orders_filled() {
    counter!(ORDERS_FILLED_TOTAL).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed() {
    counter!(ORDERS_FAILED_TOTAL).increment(1);
}

/// Increment reconciliation alarms.
pub fn inc_reconciliation_alarms() {
    counter!(RECONCILIATION_ALARMS_TOTAL).increment(1);
}

/// Increment trade log write failures.
pub fn inc_recorder_failures() {
    counter!(RECORDER_FAILURES_TOTAL).increment(1);
}

/// Publish the latest price and median.
pub fn set_market_gauges(price: Decimal, median: Option<Decimal>) {
    gauge!(LAST_PRICE).set(price.to_f64().unwrap_or_default());
    if let Some(m) = median {
        gauge!(ROLLING_MEDIAN).set(m.to_f64().unwrap_or_default());
    }
}

/// Publish cumulative realized P&L.
pub fn set_realized_pnl(pnl: Decimal) {
    gauge!(REALIZED_PNL).set(pnl.to_f64().unwrap_or_default());
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}
