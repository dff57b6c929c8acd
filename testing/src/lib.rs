//! # Grocery Testing
//!
//! Test doubles for the grocery service.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every storage trait from `grocery-core` behind one mutex
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Proptest strategies for stock batches
//!
//! ## Example
//!
//! ```
//! use grocery_core::stock::{StockBatch, StockLedger, StockLine};
//! use grocery_testing::InMemoryStore;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! let milk = store.seed_product("Milk", 3, 120);
//!
//! let batch = StockBatch::new(vec![StockLine::new(milk.id, 2)]).unwrap();
//! assert!(store.reserve(batch).await.unwrap().is_reserved());
//! # });
//! ```

pub mod memory;

pub use memory::InMemoryStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use grocery_core::environment::Clock;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use grocery_testing::mocks::FixedClock;
    /// use grocery_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can hand one copy to a store
    /// and keep another to age reservations.
    ///
    /// ```
    /// use chrono::Duration;
    /// use grocery_core::environment::Clock;
    /// use grocery_testing::mocks::{test_instant, ManualClock};
    ///
    /// let clock = ManualClock::new(test_instant());
    /// let handle = clock.clone();
    /// handle.advance(Duration::minutes(30));
    /// assert_eq!(clock.now(), test_instant() + Duration::minutes(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start the clock at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use grocery_core::stock::{StockBatch, StockLine};
    use grocery_core::{ProductId, Result};

    /// Build a batch from `(product, quantity)` pairs.
    ///
    /// # Errors
    ///
    /// Whatever [`StockBatch::new`] rejects: empty input, zero quantities,
    /// oversized batches.
    pub fn batch(lines: &[(ProductId, u32)]) -> Result<StockBatch> {
        StockBatch::new(
            lines
                .iter()
                .map(|&(product_id, quantity)| StockLine::new(product_id, quantity))
                .collect(),
        )
    }

    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; silent otherwise.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use grocery_core::stock::{StockBatch, StockLine, MAX_BATCH_LINES};
    use grocery_core::ProductId;
    use proptest::prelude::*;

    /// One of the ledger operations a property test can replay.
    #[derive(Clone, Debug)]
    pub enum LedgerOp {
        /// Reserve a batch
        Reserve(Vec<(usize, u32)>),
        /// Release a batch
        Release(Vec<(usize, u32)>),
        /// Commit a batch
        Commit(Vec<(usize, u32)>),
        /// Signed restock of one product
        Restock(usize, i64),
        /// Reset every stuck reservation
        ResetStuck,
    }

    /// Lines referencing products by index into a fixture list.
    pub fn indexed_lines(products: usize, max_quantity: u32) -> impl Strategy<Value = Vec<(usize, u32)>> {
        prop::collection::vec((0..products, 1..=max_quantity), 1..=6)
    }

    /// A random ledger operation over `products` fixtures.
    pub fn ledger_op(products: usize) -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            4 => indexed_lines(products, 5).prop_map(LedgerOp::Reserve),
            3 => indexed_lines(products, 5).prop_map(LedgerOp::Release),
            2 => indexed_lines(products, 5).prop_map(LedgerOp::Commit),
            1 => ((0..products), -5i64..10).prop_map(|(index, delta)| LedgerOp::Restock(index, delta)),
            1 => Just(LedgerOp::ResetStuck),
        ]
    }

    /// Resolve indexed lines against real product ids.
    ///
    /// Returns `None` only when the lines cannot form a valid batch.
    #[must_use]
    pub fn resolve(lines: &[(usize, u32)], products: &[ProductId]) -> Option<StockBatch> {
        if lines.len() > MAX_BATCH_LINES {
            return None;
        }
        StockBatch::new(
            lines
                .iter()
                .filter_map(|&(index, quantity)| {
                    products.get(index).map(|&id| StockLine::new(id, quantity))
                })
                .collect(),
        )
        .ok()
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, ManualClock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use grocery_core::environment::Clock;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(mocks::test_instant());
        let other = clock.clone();
        other.advance(Duration::hours(2));
        assert_eq!(clock.now(), mocks::test_instant() + Duration::hours(2));
    }
}
