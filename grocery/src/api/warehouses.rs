//! Warehouse and transfer endpoints (admin only).

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::warehouse::{
    NewWarehouse, Transfer, TransferRequest, Warehouse, WarehouseStock, DEFAULT_TRANSFER_LIMIT,
};
use grocery_core::WarehouseId;
use grocery_web::{AdminUser, AppError, JsonBody, PathParam, QueryParams};
use serde::Deserialize;

/// Transfer history paging.
#[derive(Debug, Default, Deserialize)]
pub struct TransferListQuery {
    /// Maximum entries returned
    pub limit: Option<u32>,
}

/// Every warehouse, leading first.
pub async fn list_warehouses(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<Warehouse>>, AppError> {
    Ok(Json(state.warehouses.list_warehouses().await?))
}

/// Create a secondary warehouse.
pub async fn create_warehouse(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<NewWarehouse>,
) -> Result<(StatusCode, Json<Warehouse>), AppError> {
    let warehouse = state
        .warehouses
        .create_warehouse(request.validate()?)
        .await?;
    tracing::info!(admin_id = %admin.id, warehouse_id = %warehouse.id, "Warehouse created");
    Ok((StatusCode::CREATED, Json(warehouse)))
}

/// Units on hand in one warehouse.
pub async fn inventory(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    PathParam(id): PathParam<WarehouseId>,
) -> Result<Json<Vec<WarehouseStock>>, AppError> {
    Ok(Json(state.warehouses.warehouse_inventory(id).await?))
}

/// Move units between warehouses.
///
/// Units reserved by in-flight checkouts never leave the leading warehouse;
/// a source that cannot cover the quantity is a 409 and nothing moves.
pub async fn transfer(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<TransferRequest>,
) -> Result<(StatusCode, Json<Transfer>), AppError> {
    let transfer = state.warehouses.transfer(request.validate()?).await?;
    tracing::info!(
        admin_id = %admin.id,
        transfer_id = %transfer.id,
        from = %transfer.from_warehouse_id,
        to = %transfer.to_warehouse_id,
        product_id = %transfer.product_id,
        quantity = transfer.quantity,
        "Stock transferred"
    );
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Recent transfers, newest first.
pub async fn list_transfers(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    QueryParams(query): QueryParams<TransferListQuery>,
) -> Result<Json<Vec<Transfer>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRANSFER_LIMIT);
    Ok(Json(state.warehouses.list_transfers(limit).await?))
}
