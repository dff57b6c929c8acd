//! Stock ledger endpoints.
//!
//! - `POST /api/stock/check` - read-only availability check
//! - `POST /api/stock/reserve` - all-or-nothing reservation (200 / 409)
//! - `POST /api/stock/release` - clamped release
//! - `POST /api/stock/realtime` - current counters for a list of products
//! - `GET /api/admin/stock/stuck` - products with in-flight reservations
//! - `POST /api/admin/stock/stuck/reset` - zero stuck counters

use crate::metrics;
use crate::server::state::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chrono::TimeDelta;
use grocery_core::stock::{
    validate_lookup, AvailabilityReport, FailedItem, ReleaseReport, ReservationOutcome,
    ReservedItem, StockBatch, StockLevel, StockLine,
};
use grocery_core::ProductId;
use grocery_web::{AdminUser, AppError, CurrentUser, JsonBody};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body shared by check, reserve and release.
#[derive(Debug, Deserialize)]
pub struct StockItemsRequest {
    /// Requested lines, in order
    pub items: Vec<StockLine>,
}

impl StockItemsRequest {
    fn into_batch(self) -> Result<StockBatch, AppError> {
        Ok(StockBatch::new(self.items)?)
    }
}

/// Result of a reservation attempt.
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    /// Whether the batch was applied
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Applied lines (success only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved_items: Vec<ReservedItem>,
    /// Every failing line (rejection only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<FailedItem>,
}

/// Acknowledgement of a release.
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    /// Always `true`; release never fails per line
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Per-line details
    #[serde(flatten)]
    pub report: ReleaseReport,
}

/// Body of the real-time lookup.
#[derive(Debug, Deserialize)]
pub struct RealtimeRequest {
    /// Products to look up
    pub product_ids: Vec<ProductId>,
}

/// Current counters.
#[derive(Debug, Serialize)]
pub struct RealtimeResponse {
    /// One entry per existing product, in request order
    pub products: Vec<StockLevel>,
}

/// Stuck reservation listing.
#[derive(Debug, Serialize)]
pub struct StuckResponse {
    /// Number of products listed
    pub count: usize,
    /// Products with `buying_in_progress > 0`, largest first
    pub products: Vec<StockLevel>,
}

/// Optional body of the stuck reset.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetStuckRequest {
    /// Only reset counters whose last reservation is older than this
    #[serde(default)]
    pub older_than_minutes: Option<u32>,
}

/// Result of a stuck reset.
#[derive(Debug, Serialize)]
pub struct ResetStuckResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Rows whose counter was zeroed
    pub reset_count: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Check whether every line can be fulfilled right now.
///
/// Missing products are reported, never fatal.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/stock/check \
///   -H 'Content-Type: application/json' \
///   -d '{"items":[{"product_id":"…","quantity":5}]}'
/// ```
pub async fn check_availability(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<StockItemsRequest>,
) -> Result<Json<AvailabilityReport>, AppError> {
    let batch = request.into_batch()?;
    let report = state.stock.check_availability(batch).await?;
    Ok(Json(report))
}

/// Reserve every line or none.
///
/// # Status Codes
///
/// - 200 OK: every line reserved
/// - 409 Conflict: at least one line failed; nothing was applied
pub async fn reserve(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<StockItemsRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let batch = request.into_batch()?;
    let units = batch.total_units();

    match state.stock.reserve(batch).await? {
        ReservationOutcome::Reserved(reserved_items) => {
            tracing::info!(user_id = %user.id, lines = reserved_items.len(), units, "Stock reserved");
            metrics::record_reservation_reserved(u64::try_from(units).unwrap_or(0));
            Ok((
                StatusCode::OK,
                Json(ReservationResponse {
                    success: true,
                    message: "Stock reserved successfully".to_string(),
                    reserved_items,
                    failed_items: Vec::new(),
                }),
            ))
        }
        ReservationOutcome::Rejected(failed_items) => {
            tracing::warn!(user_id = %user.id, failed = failed_items.len(), "Reservation rejected");
            metrics::record_reservation_rejected();
            Ok((
                StatusCode::CONFLICT,
                Json(ReservationResponse {
                    success: false,
                    message: "Some items could not be reserved".to_string(),
                    reserved_items: Vec::new(),
                    failed_items,
                }),
            ))
        }
    }
}

/// Release reserved units, clamped at zero.
pub async fn release(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<StockItemsRequest>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let batch = request.into_batch()?;
    let report = state.stock.release(batch).await?;
    tracing::info!(
        user_id = %user.id,
        released = report.released_items.len(),
        missing = report.missing_products.len(),
        "Stock released"
    );
    metrics::record_release();

    Ok(Json(ReleaseResponse {
        success: true,
        message: "Stock released successfully".to_string(),
        report,
    }))
}

/// Current counters for a list of products.
pub async fn realtime(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RealtimeRequest>,
) -> Result<Json<RealtimeResponse>, AppError> {
    validate_lookup(&request.product_ids)?;
    let products = state.stock.lookup(request.product_ids).await?;
    Ok(Json(RealtimeResponse { products }))
}

/// Products with reservations in flight.
pub async fn list_stuck(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<StuckResponse>, AppError> {
    let products = state.stock.list_stuck().await?;
    Ok(Json(StuckResponse {
        count: products.len(),
        products,
    }))
}

/// Zero stuck counters.
///
/// An empty body resets every nonzero counter. With `older_than_minutes`,
/// only reservations older than that are reclaimed.
pub async fn reset_stuck(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    body: Bytes,
) -> Result<Json<ResetStuckResponse>, AppError> {
    let request: ResetStuckRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ResetStuckRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("Invalid reset request: {e}")))?
    };
    let older_than = request
        .older_than_minutes
        .map(|minutes| TimeDelta::try_minutes(i64::from(minutes)))
        .map(|age| age.ok_or_else(|| AppError::bad_request("older_than_minutes is out of range")))
        .transpose()?;

    let reset_count = state.stock.reset_stuck(older_than).await?;
    tracing::warn!(
        admin_id = %admin.id,
        reset_count,
        older_than_minutes = request.older_than_minutes,
        "Stuck reservations reset"
    );
    metrics::record_stuck_reset(reset_count);

    Ok(Json(ResetStuckResponse {
        success: true,
        message: format!("Reset {reset_count} stuck reservation(s)"),
        reset_count,
    }))
}
