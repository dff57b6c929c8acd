//! Cart endpoints. The cart never reserves stock; checkout does.

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::cart::{validate_add_quantity, validate_set_quantity, Cart};
use grocery_core::ProductId;
use grocery_web::{AppError, CurrentUser, JsonBody, PathParam};
use serde::Deserialize;

/// Body of `POST /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    /// Product to add
    pub product_id: ProductId,
    /// Units to add to any existing line
    pub quantity: u32,
}

/// Body of `PUT /api/cart/items/:product_id`.
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    /// New quantity; `0` removes the line
    pub quantity: u32,
}

/// The caller's cart with live prices and availability.
pub async fn get_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(state.carts.get_cart(user.id).await?))
}

/// Add units of a product, merging with an existing line.
pub async fn add_item(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<AddItemRequest>,
) -> Result<Json<Cart>, AppError> {
    validate_add_quantity(request.quantity)?;
    state
        .carts
        .add_item(user.id, request.product_id, request.quantity)
        .await?;
    Ok(Json(state.carts.get_cart(user.id).await?))
}

/// Overwrite a line's quantity.
pub async fn set_quantity(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(product_id): PathParam<ProductId>,
    JsonBody(request): JsonBody<SetQuantityRequest>,
) -> Result<Json<Cart>, AppError> {
    validate_set_quantity(request.quantity)?;
    state
        .carts
        .set_quantity(user.id, product_id, request.quantity)
        .await?;
    Ok(Json(state.carts.get_cart(user.id).await?))
}

/// Drop a line (no-op when absent).
pub async fn remove_item(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(product_id): PathParam<ProductId>,
) -> Result<StatusCode, AppError> {
    state.carts.remove_item(user.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Empty the cart.
pub async fn clear_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    state.carts.clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
