//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: extract or generate request correlation IDs
//! - [`CurrentUser`] / [`AdminUser`]: gateway-forwarded identity
//! - [`JsonBody`], [`PathParam`], [`QueryParams`]: the stock extractors with
//!   rejections rendered as `400 BAD_REQUEST` [`AppError`]s
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     user: CurrentUser,
//!     JsonBody(request): JsonBody<NewReturn>,
//! ) -> Result<Json<ReturnRequest>, AppError> {
//!     let created = state.returns.request_return(user.id, request).await?;
//!     Ok(Json(created))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use grocery_core::users::Role;
use grocery_core::UserId;
use uuid::Uuid;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // The middleware stores the id it settled on
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }
        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The caller, as authenticated by the upstream gateway.
///
/// Rejects with `401` when `X-User-Id` is missing or not a UUID, or when
/// `X-User-Role` names an unknown role. A missing role means `customer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    /// Authenticated user id
    pub id: UserId,
    /// Role forwarded by the gateway
    pub role: Role,
}

impl CurrentUser {
    /// Whether the caller administers the shop.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .ok_or_else(|| AppError::unauthorized(format!("{USER_ID_HEADER} must be a UUID")))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::default(),
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|s| s.parse::<Role>().ok())
                .ok_or_else(|| AppError::unauthorized(format!("Unknown {USER_ROLE_HEADER}")))?,
        };

        Ok(Self { id, role })
    }
}

/// A [`CurrentUser`] with the admin role.
///
/// Rejects with `401` when unauthenticated and `403` for other roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, "Admin route refused");
            return Err(AppError::forbidden("Admin role required"));
        }
        Ok(Self(user))
    }
}

/// JSON body; malformed input is a `400`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Path parameters; unparseable ids are a `400`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParam<T>(pub T);

/// Query string; malformed values are a `400`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);
