//! Favorites endpoints. Adding and removing are idempotent.

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::catalog::Product;
use grocery_core::ProductId;
use grocery_web::{AppError, CurrentUser, PathParam};

/// Favorite products, newest first.
pub async fn list_favorites(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.favorites.list_favorites(user.id).await?))
}

/// Mark a product as favorite.
pub async fn add_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(product_id): PathParam<ProductId>,
) -> Result<StatusCode, AppError> {
    state.favorites.add_favorite(user.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unmark a product.
pub async fn remove_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(product_id): PathParam<ProductId>,
) -> Result<StatusCode, AppError> {
    state.favorites.remove_favorite(user.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
