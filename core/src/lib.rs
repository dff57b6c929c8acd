//! # Grocery Core
//!
//! Domain types, validation rules and storage traits for the grocery commerce
//! service.
//!
//! The heart of this crate is the [`stock`] module: a per-product ledger of
//! `total_available_stock` and `buying_in_progress` counters, and the
//! [`stock::StockLedger`] trait whose implementations must apply every
//! mutation as a single guarded (compare-and-increment) statement.
//!
//! ## Crate layout
//!
//! - [`stock`]: availability checks, reservations, releases, commits, stuck monitor
//! - [`catalog`]: products and categories
//! - [`cart`] / [`favorites`]: per-user shopping state
//! - [`orders`]: checkout on top of the stock ledger
//! - [`returns`]: return requests and wallet credits
//! - [`warehouse`]: warehouses and inter-warehouse transfers
//! - [`delivery`]: delivery status machine and tracking
//! - [`users`]: registration, credential checks, password hashing
//!
//! ## Implementations
//!
//! - `PostgresStore` (in `grocery-postgres`): production storage
//! - `InMemoryStore` (in `grocery-testing`): fast, deterministic tests
//!
//! Every storage trait returns boxed futures so the application can hold
//! implementations as `Arc<dyn Trait>`.

#![forbid(unsafe_code)]

use std::future::Future;
use std::pin::Pin;

pub mod cart;
pub mod catalog;
pub mod delivery;
pub mod error;
pub mod favorites;
pub mod ids;
pub mod orders;
pub mod returns;
pub mod stock;
pub mod users;
pub mod warehouse;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{DomainError, Result};
pub use ids::{
    DeliveryId, OrderId, ProductId, ReturnId, TransferId, UserId, WalletTransactionId,
    WarehouseId,
};

/// Boxed, sendable future returned by every storage trait method.
///
/// Using an explicit `Pin<Box<dyn Future>>` keeps the traits dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment module - injected dependencies that are not storage.
pub mod environment {
    use super::{BoxFuture, Result};
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use grocery_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Readiness probe for the storage backend.
    pub trait HealthCheck: Send + Sync {
        /// Verify the backend can serve queries.
        ///
        /// # Errors
        ///
        /// Returns [`DomainError::Database`](crate::DomainError::Database) when
        /// the backend is unreachable.
        fn ping(&self) -> BoxFuture<'_, Result<()>>;
    }
}
