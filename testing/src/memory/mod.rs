//! In-memory implementation of every storage trait.
//!
//! All state lives behind one mutex, so each trait method observes and
//! mutates a consistent snapshot exactly like a serializable transaction.
//! Multi-step operations check every guard before touching state; a rejected
//! operation leaves nothing behind.

mod cart;
mod catalog;
mod delivery;
mod favorites;
mod orders;
mod returns;
mod stock;
mod users;
mod warehouse;

use crate::mocks::test_clock;
use grocery_core::catalog::Product;
use grocery_core::delivery::{Delivery, DeliveryEvent};
use grocery_core::environment::{Clock, HealthCheck};
use grocery_core::orders::Order;
use grocery_core::returns::{ReturnRequest, WalletTransaction};
use grocery_core::stock::{
    CommitOutcome, CommittedItem, FailedItem, ReleaseReport, ReleasedItem, ReservationOutcome,
    ReservedItem, StockBatch, StockLevel, released_counter,
};
use grocery_core::users::{Role, StoredCredentials, User};
use grocery_core::warehouse::{Transfer, Warehouse, LEADING_WAREHOUSE_ID};
use grocery_core::{BoxFuture, DateTime, ProductId, Result, UserId, Utc, WarehouseId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A product row plus the ledger's bookkeeping column.
#[derive(Clone, Debug)]
struct StoredProduct {
    product: Product,
    last_reserved_at: Option<DateTime<Utc>>,
}

impl StoredProduct {
    fn level(&self) -> StockLevel {
        self.product.stock_level(self.last_reserved_at)
    }
}

#[derive(Clone, Debug, Default)]
struct State {
    /// Products in insertion order
    products: Vec<StoredProduct>,
    /// Cart lines per user, `(product, quantity)` in insertion order
    carts: HashMap<UserId, Vec<(ProductId, u32)>>,
    /// Favorites per user, oldest first
    favorites: HashMap<UserId, Vec<ProductId>>,
    /// Orders, oldest first
    orders: Vec<Order>,
    /// Return requests, oldest first
    returns: Vec<ReturnRequest>,
    users: Vec<StoredCredentials>,
    /// Wallet ledger, oldest first
    wallet: Vec<WalletTransaction>,
    warehouses: Vec<Warehouse>,
    /// Non-leading warehouse stock
    warehouse_stock: HashMap<(WarehouseId, ProductId), i64>,
    /// Transfers, oldest first
    transfers: Vec<Transfer>,
    /// Deliveries with their event history, oldest first
    deliveries: Vec<(Delivery, Vec<DeliveryEvent>)>,
}

impl State {
    fn product(&self, id: ProductId) -> Option<&StoredProduct> {
        self.products.iter().find(|stored| stored.product.id == id)
    }

    fn product_mut(&mut self, id: ProductId) -> Option<&mut StoredProduct> {
        self.products.iter_mut().find(|stored| stored.product.id == id)
    }

    fn level(&self, id: ProductId) -> Option<StockLevel> {
        self.product(id).map(StoredProduct::level)
    }

    /// All-or-nothing reservation.
    ///
    /// Lines are evaluated against a scratch copy of the counters so that
    /// repeated lines for one product accumulate; the copy is written back
    /// only when every line passed.
    fn reserve(&mut self, batch: &StockBatch, now: DateTime<Utc>) -> ReservationOutcome {
        let mut scratch: HashMap<ProductId, i64> = HashMap::new();
        let mut reserved = Vec::with_capacity(batch.lines().len());
        let mut failed = Vec::new();

        for line in batch {
            let Some(stored) = self.product(line.product_id) else {
                failed.push(FailedItem::reservation(line, None));
                continue;
            };
            let total = stored.product.total_available_stock;
            let in_progress = scratch
                .entry(line.product_id)
                .or_insert(stored.product.buying_in_progress);

            if total - *in_progress >= line.units() {
                *in_progress += line.units();
                reserved.push(ReservedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    buying_in_progress: *in_progress,
                    available_now: total - *in_progress,
                });
            } else {
                let level = StockLevel::new(
                    line.product_id,
                    stored.product.name.clone(),
                    total,
                    *in_progress,
                    stored.last_reserved_at,
                );
                failed.push(FailedItem::reservation(line, Some(&level)));
            }
        }

        if !failed.is_empty() {
            return ReservationOutcome::Rejected(failed);
        }
        for (id, in_progress) in scratch {
            if let Some(stored) = self.product_mut(id) {
                stored.product.buying_in_progress = in_progress;
                stored.last_reserved_at = Some(now);
            }
        }
        ReservationOutcome::Reserved(reserved)
    }

    /// Clamped release. Never rejects.
    fn release(&mut self, batch: &StockBatch) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for line in batch {
            match self.product_mut(line.product_id) {
                Some(stored) => {
                    let counter = released_counter(stored.product.buying_in_progress, line.quantity);
                    stored.product.buying_in_progress = counter;
                    report.released_items.push(ReleasedItem {
                        product_id: line.product_id,
                        quantity: line.quantity,
                        buying_in_progress: counter,
                    });
                }
                None => {
                    if !report.missing_products.contains(&line.product_id) {
                        report.missing_products.push(line.product_id);
                    }
                }
            }
        }
        report
    }

    /// All-or-nothing commit of reserved units.
    fn commit(&mut self, batch: &StockBatch) -> CommitOutcome {
        let mut scratch: HashMap<ProductId, (i64, i64)> = HashMap::new();
        let mut committed = Vec::with_capacity(batch.lines().len());
        let mut failed = Vec::new();

        for line in batch {
            let Some(stored) = self.product(line.product_id) else {
                failed.push(FailedItem::commit(line, None));
                continue;
            };
            let (total, in_progress) = scratch.entry(line.product_id).or_insert((
                stored.product.total_available_stock,
                stored.product.buying_in_progress,
            ));

            if *in_progress >= line.units() && *total >= line.units() {
                *total -= line.units();
                *in_progress -= line.units();
                committed.push(CommittedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    total_available_stock: *total,
                    buying_in_progress: *in_progress,
                });
            } else {
                let level = StockLevel::new(
                    line.product_id,
                    stored.product.name.clone(),
                    *total,
                    *in_progress,
                    stored.last_reserved_at,
                );
                failed.push(FailedItem::commit(line, Some(&level)));
            }
        }

        if !failed.is_empty() {
            return CommitOutcome::Rejected(failed);
        }
        for (id, (total, in_progress)) in scratch {
            if let Some(stored) = self.product_mut(id) {
                stored.product.total_available_stock = total;
                stored.product.buying_in_progress = in_progress;
            }
        }
        CommitOutcome::Committed(committed)
    }
}

/// Every storage trait, backed by process memory.
///
/// Clones share state. Use [`InMemoryStore::with_clock`] with a
/// [`ManualClock`](crate::ManualClock) to exercise age-bounded resets.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("products", &self.lock().products.len())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store on the fixed test clock, with the leading warehouse seeded.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(test_clock()))
    }

    /// Empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let leading = Warehouse {
            id: LEADING_WAREHOUSE_ID,
            name: "Main warehouse".to_string(),
            location: "Central".to_string(),
            is_leading: true,
            created_at: clock.now(),
        };
        let state = State {
            warehouses: vec![leading],
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create an active product in category `general`.
    pub fn seed_product(&self, name: &str, stock: i64, price_cents: i64) -> Product {
        let product = Product {
            id: ProductId::new(),
            name: name.to_string(),
            description: String::new(),
            category: "general".to_string(),
            price_cents,
            unit: "piece".to_string(),
            image_url: None,
            is_active: true,
            total_available_stock: stock,
            buying_in_progress: 0,
            created_at: self.now(),
        };
        self.lock().products.push(StoredProduct {
            product: product.clone(),
            last_reserved_at: None,
        });
        product
    }

    /// Insert a user directly, bypassing password hashing.
    pub fn seed_user(&self, email: &str, role: Role) -> User {
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            role,
            wallet_balance_cents: 0,
            created_at: self.now(),
        };
        self.lock().users.push(StoredCredentials {
            user: user.clone(),
            password_hash: String::new(),
        });
        user
    }

    /// Overwrite a product's counters, bypassing every guard.
    ///
    /// Lets tests stage stuck reservations without running checkouts.
    pub fn set_counters(
        &self,
        id: ProductId,
        total_available_stock: i64,
        buying_in_progress: i64,
        last_reserved_at: Option<DateTime<Utc>>,
    ) {
        if let Some(stored) = self.lock().product_mut(id) {
            stored.product.total_available_stock = total_available_stock;
            stored.product.buying_in_progress = buying_in_progress;
            stored.last_reserved_at = last_reserved_at;
        }
    }

    /// Deactivate a product (hidden from listings and carts).
    pub fn deactivate(&self, id: ProductId) {
        if let Some(stored) = self.lock().product_mut(id) {
            stored.product.is_active = false;
        }
    }

    /// Every product's ledger view, in insertion order.
    #[must_use]
    pub fn levels(&self) -> Vec<StockLevel> {
        self.lock().products.iter().map(StoredProduct::level).collect()
    }
}

impl HealthCheck for InMemoryStore {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}
