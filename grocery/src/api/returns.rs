//! Returns and wallet endpoints.

use crate::metrics;
use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::returns::{ApproveReturn, NewReturn, ReturnRequest, ReturnStatus, Wallet};
use grocery_core::ReturnId;
use grocery_web::{AdminUser, AppError, CurrentUser, JsonBody, PathParam, QueryParams};
use serde::Deserialize;

/// Admin listing filter.
#[derive(Debug, Default, Deserialize)]
pub struct ReturnListQuery {
    /// Restrict to one status
    pub status: Option<ReturnStatus>,
}

/// Body of a rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RejectReturnRequest {
    /// Reviewer note shown to the customer
    #[serde(default)]
    pub note: Option<String>,
}

/// File a return for a delivered order.
pub async fn request_return(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<NewReturn>,
) -> Result<(StatusCode, Json<ReturnRequest>), AppError> {
    let created = state
        .returns
        .request_return(user.id, request.validate()?)
        .await?;
    tracing::info!(
        user_id = %user.id,
        return_id = %created.id,
        order_id = %created.order_id,
        refund_cents = created.refund_cents,
        "Return requested"
    );
    metrics::record_return("requested");
    Ok((StatusCode::CREATED, Json(created)))
}

/// The caller's returns.
pub async fn list_returns(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ReturnRequest>>, AppError> {
    Ok(Json(state.returns.list_returns(user.id).await?))
}

/// The caller's wallet balance and history.
pub async fn get_wallet(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Wallet>, AppError> {
    Ok(Json(state.returns.get_wallet(user.id).await?))
}

/// Every return, optionally by status.
pub async fn list_all_returns(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    QueryParams(query): QueryParams<ReturnListQuery>,
) -> Result<Json<Vec<ReturnRequest>>, AppError> {
    Ok(Json(state.returns.list_all_returns(query.status).await?))
}

/// Approve a pending return: credit the wallet and optionally restock.
pub async fn approve_return(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<ReturnId>,
    JsonBody(decision): JsonBody<ApproveReturn>,
) -> Result<Json<ReturnRequest>, AppError> {
    let restock = decision.restock;
    let approved = state.returns.approve_return(id, decision).await?;
    tracing::info!(
        admin_id = %admin.id,
        return_id = %approved.id,
        refund_cents = approved.refund_cents,
        restock,
        "Return approved"
    );
    metrics::record_return("approved");
    metrics::record_wallet_credit(approved.refund_cents);
    Ok(Json(approved))
}

/// Reject a pending return.
pub async fn reject_return(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<ReturnId>,
    JsonBody(request): JsonBody<RejectReturnRequest>,
) -> Result<Json<ReturnRequest>, AppError> {
    let rejected = state.returns.reject_return(id, request.note).await?;
    tracing::info!(admin_id = %admin.id, return_id = %rejected.id, "Return rejected");
    metrics::record_return("rejected");
    Ok(Json(rejected))
}
