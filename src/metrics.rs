//! Prometheus metrics for order flow, ticks, and exposure.
//!
//! This module provides metrics for:
//! - Order placement outcomes (placed, dry-run, rejected, failed)
//! - Retries and idempotent replays
//! - Strategy and risk ticks
//! - Global EV exposure

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// Orders accepted by the exchange.
pub const METRIC_ORDERS_PLACED: &str = "orders_placed_total";
/// Orders recorded in dry-run mode.
pub const METRIC_ORDERS_DRY_RUN: &str = "orders_dry_run_total";
/// Orders that exhausted their retry budget.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Orders rejected by the price band or the exchange.
pub const METRIC_ORDERS_REJECTED: &str = "orders_rejected_total";
/// Placements answered from an existing record.
pub const METRIC_IDEMPOTENT_HITS: &str = "order_idempotent_hits_total";
/// Retried exchange calls.
pub const METRIC_RETRIES: &str = "exchange_retries_total";
/// Cancelled orders.
pub const METRIC_ORDERS_CANCELLED: &str = "orders_cancelled_total";
/// Orders cancelled and re-placed by TTL refresh.
pub const METRIC_ORDERS_REFRESHED: &str = "orders_refreshed_total";
/// Tick attempts.
pub const METRIC_TICKS: &str = "ticks_total";
/// Failed tick attempts.
pub const METRIC_TICK_FAILURES: &str = "tick_failures_total";
/// Markets skipped during a quoting tick.
pub const METRIC_MARKETS_SKIPPED: &str = "markets_skipped_total";
/// Aggregate absolute EV from the last risk tick.
pub const METRIC_GLOBAL_EV: &str = "global_ev_abs";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds"
    );

    describe_counter!(METRIC_ORDERS_PLACED, "Total number of orders accepted by the exchange");
    describe_counter!(METRIC_ORDERS_DRY_RUN, "Total number of dry-run orders recorded");
    describe_counter!(METRIC_ORDERS_FAILED, "Total number of orders that exhausted retries");
    describe_counter!(METRIC_ORDERS_REJECTED, "Total number of rejected orders");
    describe_counter!(METRIC_IDEMPOTENT_HITS, "Total number of idempotent placement replays");
    describe_counter!(METRIC_RETRIES, "Total number of retried exchange calls");
    describe_counter!(METRIC_ORDERS_CANCELLED, "Total number of cancelled orders");
    describe_counter!(METRIC_ORDERS_REFRESHED, "Total number of TTL-refreshed orders");
    describe_counter!(METRIC_TICKS, "Total number of tick attempts");
    describe_counter!(METRIC_TICK_FAILURES, "Total number of failed tick attempts");
    describe_counter!(METRIC_MARKETS_SKIPPED, "Total number of markets skipped in a tick");

    describe_gauge!(METRIC_GLOBAL_EV, "Aggregate absolute EV across monitored markets");

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder and describe all metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Record order submission latency.
pub fn record_order_submit_latency(latency: Duration) {
    let latency_ms = latency.as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDER_SUBMIT_LATENCY).record(latency_ms);
}

/// Increment orders placed counter.
pub fn inc_orders_placed() {
    counter!(METRIC_ORDERS_PLACED).increment(1);
}

/// Increment dry-run orders counter.
pub fn inc_orders_dry_run() {
    counter!(METRIC_ORDERS_DRY_RUN).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed() {
    counter!(METRIC_ORDERS_FAILED).increment(1);
}

/// Increment orders rejected counter.
pub fn inc_orders_rejected(reason: &'static str) {
    counter!(METRIC_ORDERS_REJECTED, "reason" => reason).increment(1);
}

/// Increment idempotent hits counter.
pub fn inc_idempotent_hits() {
    counter!(METRIC_IDEMPOTENT_HITS).increment(1);
}

/// Increment retries counter.
pub fn inc_retries(operation: &'static str) {
    counter!(METRIC_RETRIES, "operation" => operation).increment(1);
}

/// Increment cancelled orders counter.
pub fn inc_orders_cancelled() {
    counter!(METRIC_ORDERS_CANCELLED).increment(1);
}

/// Increment refreshed orders counter.
pub fn inc_orders_refreshed() {
    counter!(METRIC_ORDERS_REFRESHED).increment(1);
}

/// Increment ticks counter.
pub fn inc_ticks(bot: &str) {
    counter!(METRIC_TICKS, "bot" => bot.to_string()).increment(1);
}

/// Increment tick failures counter.
pub fn inc_tick_failures(bot: &str) {
    counter!(METRIC_TICK_FAILURES, "bot" => bot.to_string()).increment(1);
}

/// Increment markets skipped counter.
pub fn inc_markets_skipped(reason: &'static str) {
    counter!(METRIC_MARKETS_SKIPPED, "reason" => reason).increment(1);
}

/// Set the global EV gauge.
pub fn set_global_ev(value: Decimal) {
    gauge!(METRIC_GLOBAL_EV).set(value.to_f64().unwrap_or_default());
}
