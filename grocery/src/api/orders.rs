//! Checkout and order lifecycle endpoints.
//!
//! Placing an order reserves stock for every cart line (all or nothing).
//! Confirming it records payment and turns the reservation into a permanent
//! deduction; cancelling it releases the reservation.

use crate::metrics;
use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::orders::{Order, OrderStatus, PlaceOrderOutcome};
use grocery_core::stock::FailedItem;
use grocery_core::OrderId;
use grocery_web::{AdminUser, AppError, CurrentUser, PathParam, QueryParams};
use serde::{Deserialize, Serialize};

/// Result of a checkout attempt.
#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    /// Whether the order was created
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// The new order (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    /// Cart lines that could not be reserved (rejection only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<FailedItem>,
}

/// Admin listing filter.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    /// Restrict to one status
    pub status: Option<OrderStatus>,
}

/// Check out the caller's cart.
///
/// # Status Codes
///
/// - 201 Created: stock reserved, order pending payment, cart cleared
/// - 400 Bad Request: the cart is empty
/// - 409 Conflict: some lines could not be reserved; the cart is untouched
pub async fn place_order(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), AppError> {
    match state.orders.place_order(user.id).await? {
        PlaceOrderOutcome::Placed(order) => {
            tracing::info!(
                user_id = %user.id,
                order_id = %order.id,
                total_cents = order.total_cents,
                "Order placed"
            );
            metrics::record_order("placed");
            Ok((
                StatusCode::CREATED,
                Json(PlaceOrderResponse {
                    success: true,
                    message: "Order placed; awaiting payment".to_string(),
                    order: Some(order),
                    failed_items: Vec::new(),
                }),
            ))
        }
        PlaceOrderOutcome::Rejected(failed_items) => {
            tracing::warn!(user_id = %user.id, failed = failed_items.len(), "Checkout rejected");
            metrics::record_order("rejected");
            Ok((
                StatusCode::CONFLICT,
                Json(PlaceOrderResponse {
                    success: false,
                    message: "Some items could not be reserved".to_string(),
                    order: None,
                    failed_items,
                }),
            ))
        }
    }
}

/// The caller's orders, newest first.
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_orders(user.id).await?))
}

/// One order; other customers' orders are reported as missing.
pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get_order(id).await?;
    order.ensure_visible_to(user.id, user.is_admin())?;
    Ok(Json(order))
}

/// Record payment for a pending order.
pub async fn confirm_order(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.confirm_order(user.id, id).await?;
    tracing::info!(user_id = %user.id, order_id = %order.id, "Order paid");
    metrics::record_order("paid");
    Ok(Json(order))
}

/// Cancel a pending order and release its stock.
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.cancel_order(user.id, id).await?;
    tracing::info!(user_id = %user.id, order_id = %order.id, "Order cancelled");
    metrics::record_order("cancelled");
    Ok(Json(order))
}

/// Every order, optionally by status.
pub async fn list_all_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    QueryParams(query): QueryParams<OrderListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.orders.list_all_orders(query.status).await?))
}
