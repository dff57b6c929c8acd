use crate::catalog::{ProductRow, PRODUCT_COLUMNS};
use crate::{storage, PostgresStore};
use grocery_core::catalog::Product;
use grocery_core::favorites::FavoritesRepository;
use grocery_core::{BoxFuture, DomainError, ProductId, Result, UserId};

impl FavoritesRepository for PostgresStore {
    fn add_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let exists: (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(product.as_uuid())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage("check product"))?;
            if !exists.0 {
                return Err(DomainError::not_found("Product", product));
            }

            sqlx::query(
                "INSERT INTO favorites (user_id, product_id, created_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id, product_id) DO NOTHING",
            )
            .bind(user.as_uuid())
            .bind(product.as_uuid())
            .bind(self.now())
            .execute(&self.pool)
            .await
            .map_err(storage("add favorite"))?;
            Ok(())
        })
    }

    fn remove_favorite(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
                .bind(user.as_uuid())
                .bind(product.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(storage("remove favorite"))?;
            Ok(())
        })
    }

    fn list_favorites(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(async move {
            let rows: Vec<ProductRow> = sqlx::query_as(&format!(
                "SELECT {PRODUCT_COLUMNS}
                 FROM favorites f
                 JOIN products p ON p.id = f.product_id
                 WHERE f.user_id = $1
                 ORDER BY f.created_at DESC, p.name"
            ))
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list favorites"))?;

            Ok(rows.into_iter().map(Product::from).collect())
        })
    }
}
