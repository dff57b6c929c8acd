//! Warehouses and guarded inter-warehouse transfers.

use crate::{quantity_param, storage, stored_quantity, PostgresStore};
use grocery_core::warehouse::{
    insufficient_source_stock, NewWarehouse, Transfer, TransferRequest, Warehouse,
    WarehouseRepository, WarehouseStock,
};
use grocery_core::{
    BoxFuture, DateTime, DomainError, ProductId, Result, TransferId, Utc, WarehouseId,
};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid,
    name: String,
    location: String,
    is_leading: bool,
    created_at: DateTime<Utc>,
}

impl From<WarehouseRow> for Warehouse {
    fn from(row: WarehouseRow) -> Self {
        Self {
            id: WarehouseId::from_uuid(row.id),
            name: row.name,
            location: row.location,
            is_leading: row.is_leading,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: Uuid,
    from_warehouse_id: Uuid,
    to_warehouse_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = DomainError;

    fn try_from(row: TransferRow) -> Result<Self> {
        Ok(Self {
            id: TransferId::from_uuid(row.id),
            from_warehouse_id: WarehouseId::from_uuid(row.from_warehouse_id),
            to_warehouse_id: WarehouseId::from_uuid(row.to_warehouse_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: stored_quantity(row.quantity)?,
            created_at: row.created_at,
        })
    }
}

/// Whether a warehouse is the leading one; `NotFound` if it does not exist.
async fn is_leading_on(conn: &mut PgConnection, id: WarehouseId) -> Result<bool> {
    let row: Option<(bool,)> = sqlx::query_as("SELECT is_leading FROM warehouses WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("load warehouse"))?;
    row.map(|(leading,)| leading)
        .ok_or_else(|| DomainError::not_found("Warehouse", id))
}

/// Take units out of a warehouse. Returns whether the guard applied.
async fn withdraw_on(
    conn: &mut PgConnection,
    warehouse: WarehouseId,
    leading: bool,
    product: ProductId,
    quantity: i64,
) -> Result<bool> {
    let result = if leading {
        // Reserved units stay put
        sqlx::query(
            "UPDATE products SET total_available_stock = total_available_stock - $2
             WHERE id = $1 AND total_available_stock - buying_in_progress >= $2",
        )
        .bind(product.as_uuid())
        .bind(quantity)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            "UPDATE warehouse_stock SET quantity = quantity - $3
             WHERE warehouse_id = $1 AND product_id = $2 AND quantity >= $3",
        )
        .bind(warehouse.as_uuid())
        .bind(product.as_uuid())
        .bind(quantity)
        .execute(&mut *conn)
        .await
    }
    .map_err(storage("withdraw stock"))?;

    Ok(result.rows_affected() > 0)
}

/// Add units to a warehouse.
async fn deposit_on(
    conn: &mut PgConnection,
    warehouse: WarehouseId,
    leading: bool,
    product: ProductId,
    quantity: i64,
) -> Result<()> {
    if leading {
        sqlx::query(
            "UPDATE products SET total_available_stock = total_available_stock + $2 WHERE id = $1",
        )
        .bind(product.as_uuid())
        .bind(quantity)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            "INSERT INTO warehouse_stock (warehouse_id, product_id, quantity)
             VALUES ($1, $2, $3)
             ON CONFLICT (warehouse_id, product_id)
             DO UPDATE SET quantity = warehouse_stock.quantity + EXCLUDED.quantity",
        )
        .bind(warehouse.as_uuid())
        .bind(product.as_uuid())
        .bind(quantity)
        .execute(&mut *conn)
        .await
    }
    .map_err(storage("deposit stock"))?;
    Ok(())
}

impl WarehouseRepository for PostgresStore {
    fn list_warehouses(&self) -> BoxFuture<'_, Result<Vec<Warehouse>>> {
        Box::pin(async move {
            let rows: Vec<WarehouseRow> = sqlx::query_as(
                "SELECT id, name, location, is_leading, created_at FROM warehouses
                 ORDER BY is_leading DESC, name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list warehouses"))?;
            Ok(rows.into_iter().map(Warehouse::from).collect())
        })
    }

    fn create_warehouse(&self, warehouse: NewWarehouse) -> BoxFuture<'_, Result<Warehouse>> {
        Box::pin(async move {
            let row: WarehouseRow = sqlx::query_as(
                "INSERT INTO warehouses (id, name, location, is_leading, created_at)
                 VALUES ($1, $2, $3, FALSE, $4)
                 RETURNING id, name, location, is_leading, created_at",
            )
            .bind(WarehouseId::new().as_uuid())
            .bind(&warehouse.name)
            .bind(&warehouse.location)
            .bind(self.now())
            .fetch_one(&self.pool)
            .await
            .map_err(storage("create warehouse"))?;
            Ok(Warehouse::from(row))
        })
    }

    fn warehouse_inventory(&self, id: WarehouseId) -> BoxFuture<'_, Result<Vec<WarehouseStock>>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            let leading = is_leading_on(&mut conn, id).await?;

            let rows: Vec<(Uuid, String, i64)> = if leading {
                sqlx::query_as(
                    "SELECT id, name, total_available_stock FROM products
                     WHERE total_available_stock > 0
                     ORDER BY name, id",
                )
                .fetch_all(&mut *conn)
                .await
            } else {
                sqlx::query_as(
                    "SELECT s.product_id, p.name, s.quantity
                     FROM warehouse_stock s
                     JOIN products p ON p.id = s.product_id
                     WHERE s.warehouse_id = $1 AND s.quantity > 0
                     ORDER BY p.name, s.product_id",
                )
                .bind(id.as_uuid())
                .fetch_all(&mut *conn)
                .await
            }
            .map_err(storage("load warehouse inventory"))?;

            Ok(rows
                .into_iter()
                .map(|(product_id, product_name, quantity)| WarehouseStock {
                    product_id: ProductId::from_uuid(product_id),
                    product_name,
                    quantity,
                })
                .collect())
        })
    }

    #[tracing::instrument(skip(self), fields(product_id = %request.product_id))]
    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<Transfer>> {
        Box::pin(async move {
            let request = request.validate()?;
            let units = i64::from(request.quantity);
            let mut tx = self.pool.begin().await.map_err(storage("begin transfer"))?;

            let from_leading = is_leading_on(&mut tx, request.from_warehouse_id).await?;
            let to_leading = is_leading_on(&mut tx, request.to_warehouse_id).await?;

            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                    .bind(request.product_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage("check product"))?;
            if !exists {
                return Err(DomainError::not_found("Product", request.product_id));
            }

            if !withdraw_on(
                &mut tx,
                request.from_warehouse_id,
                from_leading,
                request.product_id,
                units,
            )
            .await?
            {
                tracing::warn!(quantity = request.quantity, "Transfer source cannot cover quantity");
                return Err(insufficient_source_stock(&request));
            }
            deposit_on(
                &mut tx,
                request.to_warehouse_id,
                to_leading,
                request.product_id,
                units,
            )
            .await?;

            let row: TransferRow = sqlx::query_as(
                "INSERT INTO stock_transfers
                    (id, from_warehouse_id, to_warehouse_id, product_id, quantity, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, from_warehouse_id, to_warehouse_id, product_id, quantity, created_at",
            )
            .bind(TransferId::new().as_uuid())
            .bind(request.from_warehouse_id.as_uuid())
            .bind(request.to_warehouse_id.as_uuid())
            .bind(request.product_id.as_uuid())
            .bind(quantity_param(request.quantity)?)
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage("record transfer"))?;

            tx.commit().await.map_err(storage("commit transfer"))?;
            let transfer = Transfer::try_from(row)?;
            tracing::info!(transfer_id = %transfer.id, "Stock transferred");
            Ok(transfer)
        })
    }

    fn list_transfers(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Transfer>>> {
        Box::pin(async move {
            let rows: Vec<TransferRow> = sqlx::query_as(
                "SELECT id, from_warehouse_id, to_warehouse_id, product_id, quantity, created_at
                 FROM stock_transfers
                 ORDER BY created_at DESC, id
                 LIMIT $1",
            )
            .bind(i64::from(limit.max(1)))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list transfers"))?;
            rows.into_iter().map(Transfer::try_from).collect()
        })
    }
}
