use super::{InMemoryStore, StoredProduct};
use grocery_core::catalog::{
    adjusted_stock, validate_restock_delta, CatalogRepository, CategorySummary, NewProduct, Product,
    ProductFilter,
};
use grocery_core::stock::StockLevel;
use grocery_core::{BoxFuture, DomainError, ProductId, Result};
use std::collections::BTreeMap;

impl CatalogRepository for InMemoryStore {
    fn list_products(&self, filter: ProductFilter) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(async move {
            let mut products: Vec<Product> = self
                .lock()
                .products
                .iter()
                .map(|stored| &stored.product)
                .filter(|product| filter.matches(product))
                .cloned()
                .collect();
            products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

            Ok(products
                .into_iter()
                .skip(filter.offset() as usize)
                .take(filter.limit() as usize)
                .collect())
        })
    }

    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move {
            self.lock()
                .product(id)
                .map(|stored| stored.product.clone())
                .ok_or_else(|| DomainError::not_found("Product", id))
        })
    }

    fn list_categories(&self) -> BoxFuture<'_, Result<Vec<CategorySummary>>> {
        Box::pin(async move {
            let mut counts: BTreeMap<String, i64> = BTreeMap::new();
            for stored in &self.lock().products {
                if stored.product.is_active {
                    *counts.entry(stored.product.category.clone()).or_default() += 1;
                }
            }
            Ok(counts
                .into_iter()
                .map(|(category, product_count)| CategorySummary {
                    category,
                    product_count,
                })
                .collect())
        })
    }

    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move {
            let created = Product {
                id: ProductId::new(),
                name: product.name,
                description: product.description,
                category: product.category,
                price_cents: product.price_cents,
                unit: product.unit,
                image_url: product.image_url,
                is_active: true,
                total_available_stock: product.initial_stock,
                buying_in_progress: 0,
                created_at: self.now(),
            };
            self.lock().products.push(StoredProduct {
                product: created.clone(),
                last_reserved_at: None,
            });
            Ok(created)
        })
    }

    fn restock(&self, id: ProductId, delta: i64) -> BoxFuture<'_, Result<StockLevel>> {
        Box::pin(async move {
            validate_restock_delta(delta)?;
            let mut state = self.lock();
            let stored = state
                .product_mut(id)
                .ok_or_else(|| DomainError::not_found("Product", id))?;

            let total = adjusted_stock(stored.product.total_available_stock, delta)
                .ok_or_else(|| DomainError::validation("Stock adjustment overflows"))?;
            if total < 0 || total < stored.product.buying_in_progress {
                return Err(DomainError::conflict(format!(
                    "Adjusting stock by {delta} would leave {total} unit(s) against {} reserved",
                    stored.product.buying_in_progress
                )));
            }
            stored.product.total_available_stock = total;
            Ok(stored.level())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use grocery_core::catalog::MAX_STOCK_ADJUSTMENT;

    #[tokio::test]
    async fn restock_rejects_out_of_range_delta_without_touching_stock() {
        let store = InMemoryStore::new();
        let milk = store.seed_product("Milk", 10, 199);

        for delta in [i64::MAX, i64::MIN, MAX_STOCK_ADJUSTMENT + 1] {
            let err = store.restock(milk.id, delta).await.unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "delta {delta}: {err:?}");
        }
        assert_eq!(store.levels()[0].total_available_stock, 10);

        let level = store.restock(milk.id, MAX_STOCK_ADJUSTMENT).await.unwrap();
        assert_eq!(level.total_available_stock, 10 + MAX_STOCK_ADJUSTMENT);
    }

    #[tokio::test]
    async fn restock_overflow_is_a_validation_error() {
        let store = InMemoryStore::new();
        let salt = store.seed_product("Salt", 0, 99);
        store.set_counters(salt.id, i64::MAX - 1, 0, None);

        let err = store.restock(salt.id, 5).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(store.levels()[0].total_available_stock, i64::MAX - 1);
    }
}
