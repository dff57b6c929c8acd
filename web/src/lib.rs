//! Axum integration for the grocery service.
//!
//! This crate is the imperative shell's toolbox; handlers themselves live in
//! the `grocery` application crate.
//!
//! # Request Flow
//!
//! 1. **Correlation id** assigned by [`correlation_id_layer`]
//! 2. **Identity** read from gateway headers by [`CurrentUser`] / [`AdminUser`]
//! 3. **Body / path / query** parsed by [`JsonBody`], [`PathParam`], [`QueryParams`]
//! 4. **Storage trait** called on the application state
//! 5. **`DomainError`** mapped to a `{code, message}` response by [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use grocery_web::{AppError, CurrentUser, WebResult};
//! use axum::{extract::State, Json};
//!
//! async fn get_cart(State(state): State<AppState>, user: CurrentUser) -> WebResult<Json<Cart>> {
//!     Ok(Json(state.carts.get_cart(user.id).await?))
//! }
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{
    AdminUser, CorrelationId, CurrentUser, JsonBody, PathParam, QueryParams, USER_ID_HEADER,
    USER_ROLE_HEADER,
};
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
