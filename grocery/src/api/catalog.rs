//! Catalog endpoints: public browsing and admin maintenance.

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::catalog::{
    validate_restock_delta, CategorySummary, NewProduct, Product, ProductFilter,
};
use grocery_core::stock::StockLevel;
use grocery_core::ProductId;
use grocery_web::{AdminUser, AppError, JsonBody, PathParam, QueryParams};
use serde::Deserialize;

/// Signed stock adjustment.
#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    /// Units added (positive) or written off (negative)
    pub delta: i64,
}

/// Active products, filtered and paged.
///
/// ```bash
/// curl 'http://localhost:8080/api/products?category=dairy&search=milk&limit=10'
/// ```
pub async fn list_products(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<ProductFilter>,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.catalog.list_products(filter).await?))
}

/// One product by id.
pub async fn get_product(
    State(state): State<AppState>,
    PathParam(id): PathParam<ProductId>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// Categories with their active product counts.
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategorySummary>>, AppError> {
    Ok(Json(state.catalog.list_categories().await?))
}

/// Create a product, optionally with initial stock in the leading warehouse.
pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.catalog.create_product(request.validate()?).await?;
    tracing::info!(admin_id = %admin.id, product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Adjust a product's stock.
///
/// # Status Codes
///
/// - 200 OK: adjustment applied
/// - 400 Bad Request: zero delta, or magnitude above `MAX_STOCK_ADJUSTMENT`
/// - 409 Conflict: the result would drop below the units currently reserved
pub async fn restock(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<ProductId>,
    JsonBody(request): JsonBody<RestockRequest>,
) -> Result<Json<StockLevel>, AppError> {
    validate_restock_delta(request.delta)?;
    let level = state.catalog.restock(id, request.delta).await?;
    tracing::info!(
        admin_id = %admin.id,
        product_id = %id,
        delta = request.delta,
        total_available_stock = level.total_available_stock,
        "Product restocked"
    );
    Ok(Json(level))
}
