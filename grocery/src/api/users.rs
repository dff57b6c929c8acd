//! Registration, credential checks and profile lookup.
//!
//! No token is issued here: the upstream gateway owns sessions and forwards
//! the authenticated id in `X-User-Id`. Password hashing runs on the
//! blocking pool so argon2 never stalls the async workers.

use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use grocery_core::users::{hash_password, normalize_email, verify_password, Registration, User};
use grocery_core::DomainError;
use grocery_web::{AppError, CurrentUser, JsonBody};
use serde::Deserialize;

/// Login input.
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address
    pub email: String,
    /// Plaintext password
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Register a customer account.
///
/// # Status Codes
///
/// - 201 Created: account created with an empty wallet
/// - 400 Bad Request: malformed email, blank name or short password
/// - 409 Conflict: email already registered
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<Registration>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let Registration {
        email,
        name,
        password,
    } = request.validate()?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::internal("Password hashing failed").with_source(e.into()))??;

    let user = state.users.create_user(email, name, password_hash).await?;
    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Check credentials and return the profile.
///
/// Unknown emails and wrong passwords produce the same 401.
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<User>, AppError> {
    let email = normalize_email(&request.email).map_err(|_| DomainError::InvalidCredentials)?;
    let Some(credentials) = state.users.find_credentials(email).await? else {
        tracing::debug!("Login for unknown email");
        return Err(DomainError::InvalidCredentials.into());
    };

    let password = request.password;
    let stored_hash = credentials.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::internal("Password verification failed").with_source(e.into()))?;

    if !verified {
        tracing::info!(user_id = %credentials.user.id, "Login rejected");
        return Err(DomainError::InvalidCredentials.into());
    }
    tracing::info!(user_id = %credentials.user.id, "Login succeeded");
    Ok(Json(credentials.user))
}

/// The caller's profile.
pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.get_user(user.id).await?))
}
