//! Business and HTTP metrics for the grocery service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `grocery_stock_reservations_total{outcome}` - Reservation batches by outcome
//! - `grocery_stock_units_reserved_total` - Units claimed by successful reservations
//! - `grocery_stock_releases_total` - Release batches
//! - `grocery_stock_stuck_resets_total` - Counters zeroed by resets and the sweeper
//! - `grocery_orders_total{status}` - Order transitions by resulting status
//! - `grocery_returns_total{status}` - Return requests and decisions
//! - `grocery_wallet_credits_cents_total` - Refunds credited to wallets
//!
//! ## Histograms
//! - `grocery_http_request_duration_seconds{method, path, status}` - Request latency

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;

/// Latency buckets shared by every `*_duration_seconds` histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The listener address did not parse
    #[error("Invalid metrics address {0}")]
    Address(String),
    /// The exporter could not be built or installed
    #[error("Failed to install Prometheus exporter: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Metrics are served at `http://{addr}/metrics`. Must run inside a tokio
/// runtime and only once per process.
///
/// # Errors
///
/// Returns [`MetricsError`] if the address is invalid or a recorder is
/// already installed.
pub fn install_exporter(addr: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|_| MetricsError::Address(addr.to_string()))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install()?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

/// Register metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "grocery_stock_reservations_total",
        "Reservation batches by outcome (reserved, rejected)"
    );
    describe_counter!(
        "grocery_stock_units_reserved_total",
        "Units claimed by successful reservations"
    );
    describe_counter!("grocery_stock_releases_total", "Release batches applied");
    describe_counter!(
        "grocery_stock_stuck_resets_total",
        "Reservation counters zeroed by admin resets or the sweeper"
    );
    describe_counter!(
        "grocery_orders_total",
        "Orders by resulting status (placed, rejected, paid, cancelled)"
    );
    describe_counter!(
        "grocery_returns_total",
        "Return requests by status (requested, approved, rejected)"
    );
    describe_counter!(
        "grocery_wallet_credits_cents_total",
        "Refunds credited to customer wallets in cents"
    );
    describe_histogram!(
        "grocery_http_request_duration_seconds",
        "HTTP request latency"
    );
}

// ============================================================================
// Recording
// ============================================================================

/// Record a successful reservation batch.
pub fn record_reservation_reserved(units: u64) {
    metrics::counter!("grocery_stock_reservations_total", "outcome" => "reserved").increment(1);
    metrics::counter!("grocery_stock_units_reserved_total").increment(units);
}

/// Record a rejected reservation batch.
pub fn record_reservation_rejected() {
    metrics::counter!("grocery_stock_reservations_total", "outcome" => "rejected").increment(1);
}

/// Record a release batch.
pub fn record_release() {
    metrics::counter!("grocery_stock_releases_total").increment(1);
}

/// Record counters zeroed by a reset.
pub fn record_stuck_reset(rows: u64) {
    metrics::counter!("grocery_stock_stuck_resets_total").increment(rows);
}

/// Record an order transition.
pub fn record_order(status: &'static str) {
    metrics::counter!("grocery_orders_total", "status" => status).increment(1);
}

/// Record a return request or decision.
pub fn record_return(status: &'static str) {
    metrics::counter!("grocery_returns_total", "status" => status).increment(1);
}

/// Record a wallet credit.
pub fn record_wallet_credit(cents: i64) {
    if let Ok(cents) = u64::try_from(cents) {
        metrics::counter!("grocery_wallet_credits_cents_total").increment(cents);
    }
}

/// Middleware timing every request against its route template.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(request).await;

    metrics::histogram!(
        "grocery_http_request_duration_seconds",
        "method" => method,
        "path" => path,
        "status" => response.status().as_u16().to_string(),
    )
    .record(started.elapsed().as_secs_f64());

    response
}
