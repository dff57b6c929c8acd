//! `PostgreSQL` storage for the grocery platform.
//!
//! [`PostgresStore`] implements every repository trait from `grocery-core`
//! on top of a single sqlx connection pool. All queries are runtime-checked
//! (`sqlx::query` / `sqlx::query_as`) so the crate builds without a live
//! database.
//!
//! # Stock ledger guarantees
//!
//! Every ledger mutation is a single guarded `UPDATE ... WHERE <guard>`
//! statement. Row-level locking inside `PostgreSQL` serializes concurrent
//! writers; the guard is re-evaluated against the latest committed row, so
//! no application-level lock is needed. Batches run inside one transaction
//! and are rolled back as a whole when any line's guard affects zero rows.
//!
//! The `products` table additionally carries `CHECK` constraints for
//! `0 <= buying_in_progress <= total_available_stock`.
//!
//! # Example
//!
//! ```no_run
//! use grocery_postgres::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/grocery").await?;
//! let store = PostgresStore::from_pool(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cart;
mod catalog;
mod delivery;
mod favorites;
mod orders;
mod returns;
mod stock;
mod users;
mod warehouse;

use grocery_core::environment::{Clock, HealthCheck, SystemClock};
use grocery_core::{BoxFuture, DateTime, DomainError, Result, Utc};
use sqlx::PgPool;
use std::sync::Arc;

/// `PostgreSQL`-backed implementation of every grocery repository.
///
/// Cloning is cheap: the pool and clock are shared.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    /// Wrap an existing pool, using the system clock.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Wrap an existing pool with an explicit clock.
    ///
    /// Timestamps written by the store (reservation times, order times,
    /// delivery events) come from this clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Database`] if any migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl HealthCheck for PostgresStore {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(storage("health check"))?;
            Ok(())
        })
    }
}

/// Map a sqlx error into [`DomainError::Database`] with context.
pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| {
        tracing::error!(error = %e, context, "Database operation failed");
        DomainError::database(format!("{context}: {e}"))
    }
}

/// Whether a sqlx error is a unique-constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Convert a stored `INTEGER` quantity into the domain's unsigned type.
pub(crate) fn stored_quantity(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| DomainError::database(format!("Stored quantity out of range: {value}")))
}

/// Convert a domain quantity into an `INTEGER` bind parameter.
pub(crate) fn quantity_param(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| DomainError::validation(format!("Quantity too large: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_convert_within_range() {
        assert_eq!(stored_quantity(5), Ok(5));
        assert!(stored_quantity(-1).is_err());
        assert_eq!(quantity_param(7), Ok(7));
        assert!(quantity_param(u32::MAX).is_err());
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
