//! Favorite products.

use crate::catalog::Product;
use crate::error::Result;
use crate::ids::{ProductId, UserId};
use crate::BoxFuture;

/// Favorites storage. Adding and removing are idempotent.
pub trait FavoritesRepository: Send + Sync {
    /// Mark a product as favorite.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such product
    /// - `Database`: storage failure
    fn add_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>>;

    /// Unmark a product.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn remove_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>>;

    /// The user's favorites, most recently added first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_favorites(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Product>>>;
}
