//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{extract::State, http::StatusCode, Json};
use grocery_core::environment::HealthCheck;
use serde::Serialize;
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Storage reachability
    pub database: &'static str,
}

/// Readiness check: pings storage.
///
/// # Status Codes
///
/// - 200 OK: storage answered
/// - 503 Service Unavailable: storage did not answer
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness(
    State(health): State<Arc<dyn HealthCheck>>,
) -> (StatusCode, Json<Readiness>) {
    match health.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                database: "ok",
            }),
        ),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "unavailable",
                    database: "unreachable",
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grocery_core::{BoxFuture, DomainError, Result};
    use grocery_testing::InMemoryStore;

    struct Unreachable;

    impl HealthCheck for Unreachable {
        fn ping(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Err(DomainError::database("connection refused")) })
        }
    }

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readiness_with_healthy_store() {
        let store: Arc<dyn HealthCheck> = Arc::new(InMemoryStore::new());
        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ready");
    }

    #[tokio::test]
    async fn test_readiness_with_unreachable_store() {
        let store: Arc<dyn HealthCheck> = Arc::new(Unreachable);
        let (status, Json(report)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.database, "unreachable");
    }
}
