//! Stock ledger: availability, reservation, release, finalization and the
//! stuck-reservation monitor.
//!
//! Each product carries two counters:
//!
//! - `total_available_stock`: units physically present in the leading warehouse
//! - `buying_in_progress`: units claimed by in-flight checkouts
//!
//! and the derived `available_now = total_available_stock - buying_in_progress`.
//!
//! # Invariant
//!
//! `0 <= buying_in_progress <= total_available_stock` for every product at
//! every instant. A violation is a lost-update bug, never an accepted state.
//!
//! # Concurrency contract
//!
//! Implementations of [`StockLedger`] must not read-then-write. Every
//! reservation line is a single guarded statement:
//!
//! ```text
//! buying_in_progress += q   WHERE total_available_stock - buying_in_progress >= q
//! ```
//!
//! evaluated atomically by the storage engine. Two concurrent reservations for
//! the last unit therefore cannot both succeed. A batch is all-or-nothing: if
//! any line's guard affects zero rows the whole transaction is rolled back.
//!
//! # Example
//!
//! ```
//! use grocery_core::stock::{StockBatch, StockLine};
//! use grocery_core::ProductId;
//!
//! let batch = StockBatch::new(vec![StockLine::new(ProductId::new(), 2)]);
//! assert!(batch.is_ok());
//!
//! // Empty batches never reach storage
//! assert!(StockBatch::new(vec![]).is_err());
//! ```

use crate::error::{DomainError, Result};
use crate::ids::ProductId;
use crate::BoxFuture;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Maximum number of lines accepted in one batch.
pub const MAX_BATCH_LINES: usize = 100;

// ============================================================================
// Requests
// ============================================================================

/// One `(product, quantity)` request inside a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    /// Product to reserve/release/check
    pub product_id: ProductId,
    /// Requested units (at least 1)
    pub quantity: u32,
}

impl StockLine {
    /// Create a stock line.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Requested quantity widened to the ledger's counter type.
    #[must_use]
    pub fn units(&self) -> i64 {
        i64::from(self.quantity)
    }
}

/// A validated, ordered, non-empty batch of stock lines.
///
/// Batches are ephemeral: they are never persisted, only applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockBatch {
    lines: Vec<StockLine>,
}

impl StockBatch {
    /// Validate and build a batch.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if the batch is empty, longer than
    /// [`MAX_BATCH_LINES`], or contains a zero quantity.
    pub fn new(lines: Vec<StockLine>) -> Result<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("Items must be a non-empty array"));
        }
        if lines.len() > MAX_BATCH_LINES {
            return Err(DomainError::validation(format!(
                "A batch may contain at most {MAX_BATCH_LINES} items"
            )));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(DomainError::validation(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        Ok(Self { lines })
    }

    /// The lines in submission order.
    #[must_use]
    pub fn lines(&self) -> &[StockLine] {
        &self.lines
    }

    /// Distinct product ids in first-seen order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if !ids.contains(&line.product_id) {
                ids.push(line.product_id);
            }
        }
        ids
    }

    /// Total units across all lines.
    #[must_use]
    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(StockLine::units).sum()
    }
}

impl<'a> IntoIterator for &'a StockBatch {
    type Item = &'a StockLine;
    type IntoIter = std::slice::Iter<'a, StockLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

/// Validate a product id list for the real-time lookup.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] if the list is empty or too long.
pub fn validate_lookup(product_ids: &[ProductId]) -> Result<()> {
    if product_ids.is_empty() {
        return Err(DomainError::validation("Product ids must be a non-empty array"));
    }
    if product_ids.len() > MAX_BATCH_LINES {
        return Err(DomainError::validation(format!(
            "At most {MAX_BATCH_LINES} product ids may be looked up at once"
        )));
    }
    Ok(())
}

// ============================================================================
// Ledger snapshot
// ============================================================================

/// Current counters for one product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// Product identifier
    pub product_id: ProductId,
    /// Product display name
    pub product_name: String,
    /// Units present in the leading warehouse
    pub total_available_stock: i64,
    /// Units claimed by in-flight checkouts
    pub buying_in_progress: i64,
    /// `total_available_stock - buying_in_progress`
    pub available_now: i64,
    /// Time of the most recent successful reservation
    pub last_reserved_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    /// Build a level, deriving `available_now`.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        total_available_stock: i64,
        buying_in_progress: i64,
        last_reserved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            total_available_stock,
            buying_in_progress,
            available_now: total_available_stock - buying_in_progress,
            last_reserved_at,
        }
    }

    /// Whether the ledger invariant holds for this row.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.buying_in_progress >= 0 && self.buying_in_progress <= self.total_available_stock
    }

    /// Whether the guarded reservation for `quantity` would apply.
    #[must_use]
    pub fn can_reserve(&self, quantity: u32) -> bool {
        self.available_now >= i64::from(quantity)
    }

    /// Whether the guarded commit for `quantity` would apply.
    #[must_use]
    pub fn can_commit(&self, quantity: u32) -> bool {
        let units = i64::from(quantity);
        self.buying_in_progress >= units && self.total_available_stock >= units
    }

    /// Whether a stale-reservation reset with this cutoff would clear this row.
    ///
    /// Rows without a recorded reservation time are treated as stale.
    #[must_use]
    pub fn is_stale(&self, cutoff: Option<DateTime<Utc>>) -> bool {
        if self.buying_in_progress <= 0 {
            return false;
        }
        match (cutoff, self.last_reserved_at) {
            (None, _) | (Some(_), None) => true,
            (Some(cutoff), Some(reserved_at)) => reserved_at < cutoff,
        }
    }
}

/// Counter value after releasing `quantity` units, clamped at zero.
#[must_use]
pub fn released_counter(buying_in_progress: i64, quantity: u32) -> i64 {
    (buying_in_progress - i64::from(quantity)).max(0)
}

/// Cutoff timestamp for an age-bounded stuck reset.
#[must_use]
pub fn stale_cutoff(now: DateTime<Utc>, older_than: Option<Duration>) -> Option<DateTime<Utc>> {
    older_than.map(|age| now - age)
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a line cannot be fulfilled.
///
/// Serialized as the human-readable message returned to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnavailableReason {
    /// The product id does not exist
    #[serde(rename = "Product not found")]
    ProductNotFound,
    /// Nothing is left once in-flight checkouts are accounted for
    #[serde(rename = "Other users are currently purchasing this item")]
    ConcurrentPurchase,
    /// Some units are left but fewer than requested
    #[serde(rename = "Insufficient stock available")]
    InsufficientStock,
    /// The guarded reservation affected zero rows
    #[serde(rename = "Insufficient stock or concurrent purchase")]
    ReservationConflict,
    /// The guarded commit found no matching reservation
    #[serde(rename = "No matching reservation to commit")]
    ReservationMissing,
}

impl UnavailableReason {
    /// Client-facing message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ProductNotFound => "Product not found",
            Self::ConcurrentPurchase => "Other users are currently purchasing this item",
            Self::InsufficientStock => "Insufficient stock available",
            Self::ReservationConflict => "Insufficient stock or concurrent purchase",
            Self::ReservationMissing => "No matching reservation to commit",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Per-line result of an availability check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockDetail {
    /// Product identifier
    pub product_id: ProductId,
    /// Requested units
    pub requested: u32,
    /// Units present in the leading warehouse
    pub total_available_stock: i64,
    /// Units claimed by in-flight checkouts
    pub buying_in_progress: i64,
    /// Units that could be reserved right now
    pub available_now: i64,
    /// Whether `requested <= available_now`
    pub can_fulfill: bool,
    /// Why the line cannot be fulfilled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

/// A line that cannot be fulfilled, as listed in `unavailable_items`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnavailableItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Requested units
    pub requested: u32,
    /// Units available right now (0 for missing products)
    pub available: i64,
    /// Why the line cannot be fulfilled
    pub reason: UnavailableReason,
}

/// Result of the read-only availability check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    /// Logical AND of `can_fulfill` over all lines
    pub all_available: bool,
    /// One entry per requested line, in request order
    pub stock_details: Vec<StockDetail>,
    /// The subset of lines that cannot be fulfilled
    pub unavailable_items: Vec<UnavailableItem>,
}

impl AvailabilityReport {
    /// Evaluate a batch against a snapshot of stock levels.
    ///
    /// Products absent from `levels` are reported as not found; they never
    /// abort the rest of the batch. Each line is evaluated independently.
    #[must_use]
    pub fn evaluate(batch: &StockBatch, levels: &HashMap<ProductId, StockLevel>) -> Self {
        let stock_details: Vec<StockDetail> = batch
            .lines()
            .iter()
            .map(|line| assess_line(line, levels.get(&line.product_id)))
            .collect();

        let unavailable_items: Vec<UnavailableItem> = stock_details
            .iter()
            .filter_map(|detail| {
                detail.reason.map(|reason| UnavailableItem {
                    product_id: detail.product_id,
                    requested: detail.requested,
                    available: detail.available_now,
                    reason,
                })
            })
            .collect();

        Self {
            all_available: unavailable_items.is_empty(),
            stock_details,
            unavailable_items,
        }
    }
}

/// Assess a single line against the product's current level.
#[must_use]
pub fn assess_line(line: &StockLine, level: Option<&StockLevel>) -> StockDetail {
    let Some(level) = level else {
        return StockDetail {
            product_id: line.product_id,
            requested: line.quantity,
            total_available_stock: 0,
            buying_in_progress: 0,
            available_now: 0,
            can_fulfill: false,
            reason: Some(UnavailableReason::ProductNotFound),
        };
    };

    let can_fulfill = level.can_reserve(line.quantity);
    let reason = if can_fulfill {
        None
    } else if level.available_now <= 0 {
        Some(UnavailableReason::ConcurrentPurchase)
    } else {
        Some(UnavailableReason::InsufficientStock)
    };

    StockDetail {
        product_id: line.product_id,
        requested: line.quantity,
        total_available_stock: level.total_available_stock,
        buying_in_progress: level.buying_in_progress,
        available_now: level.available_now,
        can_fulfill,
        reason,
    }
}

/// A line whose guarded update affected zero rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Requested units
    pub requested: u32,
    /// Units visible at the time of failure
    pub available: i64,
    /// Why the guard did not apply
    pub reason: UnavailableReason,
}

impl FailedItem {
    /// Describe a failed reservation guard.
    #[must_use]
    pub fn reservation(line: &StockLine, level: Option<&StockLevel>) -> Self {
        match level {
            None => Self::not_found(line),
            Some(level) => Self {
                product_id: line.product_id,
                requested: line.quantity,
                available: level.available_now.max(0),
                reason: UnavailableReason::ReservationConflict,
            },
        }
    }

    /// Describe a failed commit guard.
    #[must_use]
    pub fn commit(line: &StockLine, level: Option<&StockLevel>) -> Self {
        match level {
            None => Self::not_found(line),
            Some(level) => Self {
                product_id: line.product_id,
                requested: line.quantity,
                available: level.buying_in_progress,
                reason: UnavailableReason::ReservationMissing,
            },
        }
    }

    fn not_found(line: &StockLine) -> Self {
        Self {
            product_id: line.product_id,
            requested: line.quantity,
            available: 0,
            reason: UnavailableReason::ProductNotFound,
        }
    }
}

/// A successfully reserved line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReservedItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Units reserved by this line
    pub quantity: u32,
    /// Counter value after the increment
    pub buying_in_progress: i64,
    /// Units still reservable after the increment
    pub available_now: i64,
}

/// All-or-nothing result of a reservation batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Every line applied; the transaction committed
    Reserved(Vec<ReservedItem>),
    /// At least one line failed; nothing was applied
    Rejected(Vec<FailedItem>),
}

impl ReservationOutcome {
    /// Whether the batch was applied.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved(_))
    }
}

/// A released line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReleasedItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Units requested for release
    pub quantity: u32,
    /// Counter value after the clamped decrement
    pub buying_in_progress: i64,
}

/// Acknowledgement of a release batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Lines that matched an existing product
    pub released_items: Vec<ReleasedItem>,
    /// Product ids that do not exist (skipped)
    pub missing_products: Vec<ProductId>,
}

/// A reservation converted into a permanent deduction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommittedItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Units deducted
    pub quantity: u32,
    /// Stock after the deduction
    pub total_available_stock: i64,
    /// Counter after the deduction
    pub buying_in_progress: i64,
}

/// All-or-nothing result of a commit batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every line applied
    Committed(Vec<CommittedItem>),
    /// At least one line had no matching reservation; nothing was applied
    Rejected(Vec<FailedItem>),
}

// ============================================================================
// Ledger trait
// ============================================================================

/// Storage abstraction for the stock ledger.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; they are shared across request
/// tasks behind an `Arc`. No implementation may hold an application-level
/// lock across an `.await` on the database: serialization is the storage
/// engine's job.
pub trait StockLedger: Send + Sync {
    /// Current levels for the given products, in request order.
    ///
    /// Unknown ids are omitted from the result.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn lookup(&self, product_ids: Vec<ProductId>) -> BoxFuture<'_, Result<Vec<StockLevel>>>;

    /// Read-only availability check against one snapshot.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn check_availability(&self, batch: StockBatch) -> BoxFuture<'_, Result<AvailabilityReport>> {
        Box::pin(async move {
            let levels = self.lookup(batch.product_ids()).await?;
            let by_id: HashMap<ProductId, StockLevel> = levels
                .into_iter()
                .map(|level| (level.product_id, level))
                .collect();
            Ok(AvailabilityReport::evaluate(&batch, &by_id))
        })
    }

    /// Atomically reserve every line or none.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure (any partial work is rolled back)
    fn reserve(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReservationOutcome>>;

    /// Decrement counters, clamped at zero. Never contended, never rejected.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn release(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReleaseReport>>;

    /// Convert reservations into permanent stock deductions, all or nothing.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn commit(&self, batch: StockBatch) -> BoxFuture<'_, Result<CommitOutcome>>;

    /// Products with `buying_in_progress > 0`, largest counter first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_stuck(&self) -> BoxFuture<'_, Result<Vec<StockLevel>>>;

    /// Zero every nonzero counter, optionally only those whose last
    /// reservation is older than `older_than`. Returns the number of rows reset.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn reset_stuck(&self, older_than: Option<Duration>) -> BoxFuture<'_, Result<u64>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level(total: i64, reserved: i64) -> StockLevel {
        StockLevel::new(ProductId::new(), "Apples", total, reserved, None)
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = StockBatch::new(vec![]).err();
        assert!(matches!(err, Some(DomainError::Validation(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = StockBatch::new(vec![StockLine::new(ProductId::new(), 0)]).err();
        assert!(matches!(err, Some(DomainError::Validation(_))));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let lines = (0..=MAX_BATCH_LINES)
            .map(|_| StockLine::new(ProductId::new(), 1))
            .collect();
        assert!(StockBatch::new(lines).is_err());
    }

    #[test]
    fn product_ids_are_deduplicated_in_order() {
        let a = ProductId::new();
        let b = ProductId::new();
        let batch = StockBatch::new(vec![
            StockLine::new(a, 1),
            StockLine::new(b, 2),
            StockLine::new(a, 3),
        ])
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(batch.product_ids(), vec![a, b]);
        assert_eq!(batch.total_units(), 6);
    }

    #[test]
    fn fulfillable_line_has_no_reason() {
        let level = level(10, 0);
        let detail = assess_line(&StockLine::new(level.product_id, 5), Some(&level));
        assert!(detail.can_fulfill);
        assert_eq!(detail.available_now, 10);
        assert_eq!(detail.reason, None);
    }

    #[test]
    fn missing_product_reports_not_found_with_zeroes() {
        let detail = assess_line(&StockLine::new(ProductId::new(), 1), None);
        assert!(!detail.can_fulfill);
        assert_eq!(detail.available_now, 0);
        assert_eq!(detail.reason, Some(UnavailableReason::ProductNotFound));
    }

    #[test]
    fn exhausted_headroom_reports_concurrent_purchase() {
        let level = level(4, 4);
        let detail = assess_line(&StockLine::new(level.product_id, 1), Some(&level));
        assert_eq!(detail.reason, Some(UnavailableReason::ConcurrentPurchase));
    }

    #[test]
    fn partial_headroom_reports_insufficient_stock() {
        let level = level(4, 1);
        let detail = assess_line(&StockLine::new(level.product_id, 5), Some(&level));
        assert_eq!(detail.reason, Some(UnavailableReason::InsufficientStock));
    }

    #[test]
    fn report_aggregates_unavailable_items() {
        let present = level(10, 0);
        let missing = ProductId::new();
        let batch = StockBatch::new(vec![
            StockLine::new(present.product_id, 5),
            StockLine::new(missing, 1),
        ])
        .unwrap_or_else(|_| unreachable!());
        let levels = HashMap::from([(present.product_id, present.clone())]);

        let report = AvailabilityReport::evaluate(&batch, &levels);

        assert!(!report.all_available);
        assert_eq!(report.stock_details.len(), 2);
        assert!(report.stock_details[0].can_fulfill);
        assert_eq!(report.unavailable_items.len(), 1);
        assert_eq!(report.unavailable_items[0].product_id, missing);
        assert_eq!(report.unavailable_items[0].available, 0);
        assert_eq!(
            report.unavailable_items[0].reason,
            UnavailableReason::ProductNotFound
        );
    }

    #[test]
    fn reasons_serialize_as_messages() {
        let json = serde_json::to_string(&UnavailableReason::ReservationConflict)
            .unwrap_or_default();
        assert_eq!(json, "\"Insufficient stock or concurrent purchase\"");
        assert_eq!(
            UnavailableReason::ConcurrentPurchase.to_string(),
            "Other users are currently purchasing this item"
        );
    }

    #[test]
    fn failed_reservation_uses_contention_reason() {
        let level = level(10, 5);
        let failed = FailedItem::reservation(&StockLine::new(level.product_id, 6), Some(&level));
        assert_eq!(failed.reason, UnavailableReason::ReservationConflict);
        assert_eq!(failed.available, 5);
    }

    #[test]
    fn stale_detection_respects_cutoff() {
        let now = Utc::now();
        let mut row = level(10, 3);
        assert!(row.is_stale(None));

        row.last_reserved_at = Some(now - Duration::minutes(30));
        assert!(row.is_stale(stale_cutoff(now, Some(Duration::minutes(15)))));
        assert!(!row.is_stale(stale_cutoff(now, Some(Duration::hours(1)))));

        let idle = level(10, 0);
        assert!(!idle.is_stale(None));
    }

    proptest! {
        #[test]
        fn release_never_goes_negative(current in 0i64..1_000, quantity in 0u32..2_000) {
            let after = released_counter(current, quantity);
            prop_assert!(after >= 0);
            prop_assert!(after <= current);
        }

        #[test]
        fn releasing_twice_is_clamped(current in 0i64..100, quantity in 0u32..100) {
            let once = released_counter(current, quantity);
            let twice = released_counter(once, quantity);
            prop_assert!(twice >= 0);
            prop_assert!(twice <= once);
        }

        #[test]
        fn reservation_guard_preserves_invariant(
            total in 0i64..500,
            reserved_fraction in 0i64..=100,
            quantity in 1u32..600,
        ) {
            let reserved = total * reserved_fraction / 100;
            let row = level(total, reserved);
            if row.can_reserve(quantity) {
                let after = reserved + i64::from(quantity);
                prop_assert!(after <= total);
            }
        }
    }
}
