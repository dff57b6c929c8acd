use super::InMemoryStore;
use grocery_core::catalog::Product;
use grocery_core::favorites::FavoritesRepository;
use grocery_core::{BoxFuture, DomainError, ProductId, Result, UserId};

impl FavoritesRepository for InMemoryStore {
    fn add_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.product(product).is_none() {
                return Err(DomainError::not_found("Product", product));
            }
            let favorites = state.favorites.entry(user).or_default();
            if !favorites.contains(&product) {
                favorites.push(product);
            }
            Ok(())
        })
    }

    fn remove_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(favorites) = self.lock().favorites.get_mut(&user) {
                favorites.retain(|id| *id != product);
            }
            Ok(())
        })
    }

    fn list_favorites(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(async move {
            let state = self.lock();
            Ok(state
                .favorites
                .get(&user)
                .into_iter()
                .flatten()
                .rev()
                .filter_map(|&id| state.product(id).map(|stored| stored.product.clone()))
                .collect())
        })
    }
}
