//! Delivery scheduling and tracking.

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::delivery::{Delivery, DeliveryStatus, NewDelivery, Tracking};
use grocery_core::{DeliveryId, OrderId};
use grocery_web::{AdminUser, AppError, CurrentUser, JsonBody, PathParam};
use serde::Deserialize;

/// Body of a status update.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    /// Status to enter
    pub status: DeliveryStatus,
    /// Optional courier or admin note
    #[serde(default)]
    pub note: Option<String>,
}

/// Schedule a delivery for a paid order.
pub async fn create_delivery(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<NewDelivery>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let delivery = state.deliveries.create_delivery(request.validate()?).await?;
    tracing::info!(
        admin_id = %admin.id,
        delivery_id = %delivery.id,
        order_id = %delivery.order_id,
        "Delivery scheduled"
    );
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// Advance a delivery. Reaching `delivered` also marks the order delivered.
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<DeliveryId>,
    JsonBody(request): JsonBody<StatusUpdateRequest>,
) -> Result<Json<Delivery>, AppError> {
    let note = request
        .note
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty());
    let delivery = state
        .deliveries
        .update_status(id, request.status, note)
        .await?;
    tracing::info!(
        admin_id = %admin.id,
        delivery_id = %delivery.id,
        status = %delivery.status,
        "Delivery status updated"
    );
    Ok(Json(delivery))
}

/// Tracking for one of the caller's orders.
pub async fn tracking(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(order_id): PathParam<OrderId>,
) -> Result<Json<Tracking>, AppError> {
    let order = state.orders.get_order(order_id).await?;
    order.ensure_visible_to(user.id, user.is_admin())?;
    Ok(Json(state.deliveries.tracking(order_id).await?))
}
