//! Catalog queries and the guarded restock adjustment.

use crate::stock::{level_on, LevelRow, LEVEL_COLUMNS};
use crate::{storage, PostgresStore};
use grocery_core::catalog::{
    validate_restock_delta, CatalogRepository, CategorySummary, NewProduct, Product, ProductFilter,
};
use grocery_core::stock::StockLevel;
use grocery_core::{BoxFuture, DateTime, DomainError, ProductId, Result, Utc};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    category: String,
    price_cents: i64,
    unit: String,
    image_url: Option<String>,
    is_active: bool,
    total_available_stock: i64,
    buying_in_progress: i64,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            category: row.category,
            price_cents: row.price_cents,
            unit: row.unit,
            image_url: row.image_url,
            is_active: row.is_active,
            total_available_stock: row.total_available_stock,
            buying_in_progress: row.buying_in_progress,
            created_at: row.created_at,
        }
    }
}

/// Column list for [`ProductRow`], qualified with the `p` alias.
pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.category, \
     p.price_cents, p.unit, p.image_url, p.is_active, p.total_available_stock, \
     p.buying_in_progress, p.created_at";

impl CatalogRepository for PostgresStore {
    fn list_products(&self, filter: ProductFilter) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(async move {
            let search = filter.search().map(|term| format!("%{}%", escape_like(&term)));
            let rows: Vec<ProductRow> = sqlx::query_as(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products p
                 WHERE p.is_active
                   AND ($1::text IS NULL OR p.category = $1)
                   AND ($2::text IS NULL OR p.name ILIKE $2)
                 ORDER BY p.name, p.id
                 LIMIT $3 OFFSET $4"
            ))
            .bind(filter.category())
            .bind(search)
            .bind(i64::from(filter.limit()))
            .bind(i64::from(filter.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list products"))?;

            Ok(rows.into_iter().map(Product::from).collect())
        })
    }

    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move {
            let row: Option<ProductRow> = sqlx::query_as(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("get product"))?;

            row.map(Product::from)
                .ok_or_else(|| DomainError::not_found("Product", id))
        })
    }

    fn list_categories(&self) -> BoxFuture<'_, Result<Vec<CategorySummary>>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT category, COUNT(*) FROM products
                 WHERE is_active
                 GROUP BY category
                 ORDER BY category",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list categories"))?;

            Ok(rows
                .into_iter()
                .map(|(category, product_count)| CategorySummary {
                    category,
                    product_count,
                })
                .collect())
        })
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move {
            let row: ProductRow = sqlx::query_as(&format!(
                "INSERT INTO products AS p
                    (id, name, description, category, price_cents, unit, image_url,
                     total_available_stock, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING {PRODUCT_COLUMNS}"
            ))
            .bind(ProductId::new().as_uuid())
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.category)
            .bind(product.price_cents)
            .bind(&product.unit)
            .bind(&product.image_url)
            .bind(product.initial_stock)
            .bind(self.now())
            .fetch_one(&self.pool)
            .await
            .map_err(storage("create product"))?;

            tracing::info!(product_id = %row.id, "Product created");
            Ok(Product::from(row))
        })
    }

    #[tracing::instrument(skip(self))]
    fn restock(&self, id: ProductId, delta: i64) -> BoxFuture<'_, Result<StockLevel>> {
        Box::pin(async move {
            validate_restock_delta(delta)?;
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;

            let updated: Option<LevelRow> = sqlx::query_as(&format!(
                "UPDATE products
                 SET total_available_stock = total_available_stock + $2
                 WHERE id = $1
                   AND total_available_stock + $2 >= buying_in_progress
                   AND total_available_stock + $2 >= 0
                 RETURNING {LEVEL_COLUMNS}"
            ))
            .bind(id.as_uuid())
            .bind(delta)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage("restock product"))?;

            if let Some(row) = updated {
                let level = StockLevel::from(row);
                tracing::info!(total = level.total_available_stock, "Stock adjusted");
                return Ok(level);
            }

            match level_on(&mut conn, id).await? {
                None => Err(DomainError::not_found("Product", id)),
                Some(level) => Err(DomainError::conflict(format!(
                    "Adjusting stock by {delta} would leave {} unit(s) against {} reserved",
                    level.total_available_stock.saturating_add(delta),
                    level.buying_in_progress
                ))),
            }
        })
    }
}

/// Escape `%`, `_` and `\` so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("apple"), "apple");
    }
}
