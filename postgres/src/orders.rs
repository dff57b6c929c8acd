//! Checkout and order lifecycle.
//!
//! Each lifecycle step shares one transaction with its ledger statement:
//! placing an order reserves, confirming commits, cancelling releases.

use crate::cart::{cart_on, clear_on};
use crate::stock::{commit_in_tx, release_in_tx, reserve_in_tx};
use crate::{quantity_param, storage, stored_quantity, PostgresStore};
use grocery_core::orders::{
    order_total, Order, OrderItem, OrderRepository, OrderStatus, PlaceOrderOutcome,
};
use grocery_core::stock::{CommitOutcome, ReservationOutcome, StockBatch, StockLine};
use grocery_core::{BoxFuture, DateTime, DomainError, OrderId, ProductId, Result, UserId, Utc};
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price_cents: i64,
}

const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, created_at, updated_at";

/// Attach items to order rows, preserving row order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let items: Vec<ItemRow> = sqlx::query_as(
        r"
        SELECT order_id, product_id, product_name, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY product_name, product_id
        ",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage("load order items"))?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(OrderItem {
            product_id: ProductId::from_uuid(item.product_id),
            product_name: item.product_name,
            quantity: stored_quantity(item.quantity)?,
            unit_price_cents: item.unit_price_cents,
        });
    }

    rows.into_iter()
        .map(|row| {
            Ok(Order {
                id: OrderId::from_uuid(row.id),
                user_id: UserId::from_uuid(row.user_id),
                status: row.status.parse()?,
                total_cents: row.total_cents,
                items: by_order.remove(&row.id).unwrap_or_default(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}

/// Load one order on an existing connection, optionally locking its row.
pub(crate) async fn order_on(
    conn: &mut PgConnection,
    id: OrderId,
    for_update: bool,
) -> Result<Option<Order>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage("load order"))?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(hydrate(conn, vec![row]).await?.pop())
}

/// Guarded status change: applies only if the order is still in `from`.
pub(crate) async fn transition_on(
    conn: &mut PgConnection,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(from.transition_error(to));
    }
    let result = sqlx::query(
        "UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
    )
    .bind(id.as_uuid())
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(storage("update order status"))?;

    if result.rows_affected() == 0 {
        return Err(DomainError::conflict(format!(
            "Order {id} is no longer {from}"
        )));
    }
    Ok(())
}

/// Lock an order owned by `user` for a lifecycle step.
async fn owned_order_for_update(
    conn: &mut PgConnection,
    user: UserId,
    id: OrderId,
) -> Result<Order> {
    let order = order_on(conn, id, true)
        .await?
        .ok_or_else(|| DomainError::not_found("Order", id))?;
    order.ensure_visible_to(user, false)?;
    Ok(order)
}

impl OrderRepository for PostgresStore {
    #[tracing::instrument(skip(self))]
    fn place_order(&self, user: UserId) -> BoxFuture<'_, Result<PlaceOrderOutcome>> {
        Box::pin(async move {
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin checkout"))?;

            let cart = cart_on(&mut tx, user).await?;
            if cart.is_empty() {
                return Err(DomainError::validation("Cart is empty"));
            }
            let batch = StockBatch::new(
                cart.lines
                    .iter()
                    .map(|line| StockLine::new(line.product_id, line.quantity))
                    .collect(),
            )?;

            if let ReservationOutcome::Rejected(failed) =
                reserve_in_tx(&mut tx, &batch, now).await?
            {
                tx.rollback().await.map_err(storage("roll back checkout"))?;
                tracing::warn!(failed = failed.len(), "Checkout rejected");
                return Ok(PlaceOrderOutcome::Rejected(failed));
            }

            let items: Vec<OrderItem> = cart
                .lines
                .into_iter()
                .map(|line| OrderItem {
                    product_id: line.product_id,
                    product_name: line.name,
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                })
                .collect();
            let order = Order {
                id: OrderId::new(),
                user_id: user,
                status: OrderStatus::PendingPayment,
                total_cents: order_total(&items),
                items,
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                "INSERT INTO orders (id, user_id, status, total_cents, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $5)",
            )
            .bind(order.id.as_uuid())
            .bind(user.as_uuid())
            .bind(order.status.as_str())
            .bind(order.total_cents)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage("insert order"))?;

            for item in &order.items {
                sqlx::query(
                    "INSERT INTO order_items
                        (order_id, product_id, product_name, quantity, unit_price_cents)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(order.id.as_uuid())
                .bind(item.product_id.as_uuid())
                .bind(&item.product_name)
                .bind(quantity_param(item.quantity)?)
                .bind(item.unit_price_cents)
                .execute(&mut *tx)
                .await
                .map_err(storage("insert order item"))?;
            }

            clear_on(&mut tx, user).await?;
            tx.commit().await.map_err(storage("commit checkout"))?;

            tracing::info!(order_id = %order.id, total_cents = order.total_cents, "Order placed");
            Ok(PlaceOrderOutcome::Placed(order))
        })
    }

    #[tracing::instrument(skip(self))]
    fn confirm_order(&self, user: UserId, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin confirmation"))?;

            let mut order = owned_order_for_update(&mut tx, user, id).await?;
            transition_on(&mut tx, id, order.status, OrderStatus::Paid, now).await?;

            if let CommitOutcome::Rejected(failed) =
                commit_in_tx(&mut tx, &order.stock_batch()?).await?
            {
                tx.rollback().await.map_err(storage("roll back confirmation"))?;
                tracing::error!(order_id = %id, failed = failed.len(), "Reservation missing at confirmation");
                return Err(DomainError::conflict(format!(
                    "Reserved stock for order {id} no longer matches its items"
                )));
            }

            tx.commit().await.map_err(storage("commit confirmation"))?;
            order.status = OrderStatus::Paid;
            order.updated_at = now;
            Ok(order)
        })
    }

    #[tracing::instrument(skip(self))]
    fn cancel_order(&self, user: UserId, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin cancellation"))?;

            let mut order = owned_order_for_update(&mut tx, user, id).await?;
            transition_on(&mut tx, id, order.status, OrderStatus::Cancelled, now).await?;
            release_in_tx(&mut tx, &order.stock_batch()?).await?;

            tx.commit().await.map_err(storage("commit cancellation"))?;
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;
            Ok(order)
        })
    }

    fn get_order(&self, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            order_on(&mut conn, id, false)
                .await?
                .ok_or_else(|| DomainError::not_found("Order", id))
        })
    }

    fn list_orders(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            let rows: Vec<OrderRow> = sqlx::query_as(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1
                 ORDER BY created_at DESC, id"
            ))
            .bind(user.as_uuid())
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("list orders"))?;
            hydrate(&mut conn, rows).await
        })
    }

    fn list_all_orders(&self, status: Option<OrderStatus>) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            let rows: Vec<OrderRow> = sqlx::query_as(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders
                 WHERE ($1::text IS NULL OR status = $1)
                 ORDER BY created_at DESC, id"
            ))
            .bind(status.map(OrderStatus::as_str))
            .fetch_all(&mut *conn)
            .await
            .map_err(storage("list all orders"))?;
            hydrate(&mut conn, rows).await
        })
    }
}
