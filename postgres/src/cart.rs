use crate::{quantity_param, storage, stored_quantity, PostgresStore};
use grocery_core::cart::{
    validate_add_quantity, validate_set_quantity, Cart, CartLine, CartRepository,
    MAX_LINE_QUANTITY,
};
use grocery_core::{BoxFuture, DomainError, ProductId, Result, UserId};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct CartRow {
    product_id: Uuid,
    name: String,
    price_cents: i64,
    quantity: i32,
    available_now: i64,
}

/// Load a cart on an existing connection (checkout reads it inside its
/// transaction).
pub(crate) async fn cart_on(conn: &mut PgConnection, user: UserId) -> Result<Cart> {
    let rows: Vec<CartRow> = sqlx::query_as(
        r"
        SELECT c.product_id, p.name, p.price_cents, c.quantity,
               p.total_available_stock - p.buying_in_progress AS available_now
        FROM cart_items c
        JOIN products p ON p.id = c.product_id
        WHERE c.user_id = $1
        ORDER BY p.name, c.product_id
        ",
    )
    .bind(user.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage("load cart"))?;

    let lines = rows
        .into_iter()
        .map(|row| {
            Ok(CartLine::new(
                ProductId::from_uuid(row.product_id),
                row.name,
                row.price_cents,
                stored_quantity(row.quantity)?,
                row.available_now,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Cart::new(user, lines))
}

/// Remove every line of a cart on an existing connection.
pub(crate) async fn clear_on(conn: &mut PgConnection, user: UserId) -> Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(storage("clear cart"))?;
    Ok(())
}

impl CartRepository for PostgresStore {
    fn get_cart(&self, user: UserId) -> BoxFuture<'_, Result<Cart>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            cart_on(&mut conn, user).await
        })
    }

    fn add_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            validate_add_quantity(quantity)?;
            let quantity = quantity_param(quantity)?;

            // Inserting through SELECT skips missing and inactive products;
            // the conflict guard enforces the per-line cap.
            let merged = sqlx::query(
                r"
                INSERT INTO cart_items (user_id, product_id, quantity, added_at)
                SELECT $1, p.id, $3, $4
                FROM products p
                WHERE p.id = $2 AND p.is_active
                ON CONFLICT (user_id, product_id)
                DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
                WHERE cart_items.quantity + EXCLUDED.quantity <= $5
                ",
            )
            .bind(user.as_uuid())
            .bind(product.as_uuid())
            .bind(quantity)
            .bind(self.now())
            .bind(quantity_param(MAX_LINE_QUANTITY)?)
            .execute(&self.pool)
            .await
            .map_err(storage("add cart item"))?;

            if merged.rows_affected() > 0 {
                return Ok(());
            }

            let active: Option<(bool,)> =
                sqlx::query_as("SELECT is_active FROM products WHERE id = $1")
                    .bind(product.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage("check product"))?;

            match active {
                Some((true,)) => Err(DomainError::validation(format!(
                    "Quantity must not exceed {MAX_LINE_QUANTITY}"
                ))),
                _ => Err(DomainError::not_found("Product", product)),
            }
        })
    }

    fn set_quantity(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            validate_set_quantity(quantity)?;

            let result = if quantity == 0 {
                sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
                    .bind(user.as_uuid())
                    .bind(product.as_uuid())
                    .execute(&self.pool)
                    .await
            } else {
                sqlx::query(
                    "UPDATE cart_items SET quantity = $3 WHERE user_id = $1 AND product_id = $2",
                )
                .bind(user.as_uuid())
                .bind(product.as_uuid())
                .bind(quantity_param(quantity)?)
                .execute(&self.pool)
                .await
            }
            .map_err(storage("set cart quantity"))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::not_found("Cart item", product));
            }
            Ok(())
        })
    }

    fn remove_item(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
                .bind(user.as_uuid())
                .bind(product.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(storage("remove cart item"))?;
            Ok(())
        })
    }

    fn clear(&self, user: UserId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            clear_on(&mut conn, user).await
        })
    }
}
