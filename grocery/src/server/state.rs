//! Application state for the grocery HTTP server.

use axum::extract::FromRef;
use grocery_core::cart::CartRepository;
use grocery_core::catalog::CatalogRepository;
use grocery_core::delivery::DeliveryRepository;
use grocery_core::environment::HealthCheck;
use grocery_core::favorites::FavoritesRepository;
use grocery_core::orders::OrderRepository;
use grocery_core::returns::ReturnRepository;
use grocery_core::stock::StockLedger;
use grocery_core::users::UserRepository;
use grocery_core::warehouse::WarehouseRepository;
use std::sync::Arc;

/// Every repository the service needs, implemented by one backend.
///
/// `PostgresStore` in production, `InMemoryStore` in tests.
pub trait Storage:
    StockLedger
    + CatalogRepository
    + CartRepository
    + FavoritesRepository
    + OrderRepository
    + ReturnRepository
    + WarehouseRepository
    + DeliveryRepository
    + UserRepository
    + HealthCheck
    + 'static
{
}

impl<T> Storage for T where
    T: StockLedger
        + CatalogRepository
        + CartRepository
        + FavoritesRepository
        + OrderRepository
        + ReturnRepository
        + WarehouseRepository
        + DeliveryRepository
        + UserRepository
        + HealthCheck
        + 'static
{
}

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via `Arc`) for each request. Handlers depend on the
/// narrowest repository trait they need.
#[derive(Clone, FromRef)]
pub struct AppState {
    /// Stock ledger
    pub stock: Arc<dyn StockLedger>,
    /// Products and categories
    pub catalog: Arc<dyn CatalogRepository>,
    /// Shopping carts
    pub carts: Arc<dyn CartRepository>,
    /// Favorites
    pub favorites: Arc<dyn FavoritesRepository>,
    /// Orders and checkout
    pub orders: Arc<dyn OrderRepository>,
    /// Returns and wallets
    pub returns: Arc<dyn ReturnRepository>,
    /// Warehouses and transfers
    pub warehouses: Arc<dyn WarehouseRepository>,
    /// Deliveries
    pub deliveries: Arc<dyn DeliveryRepository>,
    /// User accounts
    pub users: Arc<dyn UserRepository>,
    /// Readiness probe
    pub health: Arc<dyn HealthCheck>,
}

impl AppState {
    /// Build state backed by a single storage implementation.
    #[must_use]
    pub fn new<S: Storage>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            stock: store.clone(),
            catalog: store.clone(),
            carts: store.clone(),
            favorites: store.clone(),
            orders: store.clone(),
            returns: store.clone(),
            warehouses: store.clone(),
            deliveries: store.clone(),
            users: store.clone(),
            health: store,
        }
    }
}
