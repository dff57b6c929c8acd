//! Guarded stock ledger statements.
//!
//! The `*_in_tx` helpers run against an open connection so checkout, order
//! confirmation and cancellation can share a transaction with their own
//! writes. The caller decides whether to commit.

use crate::{storage, PostgresStore};
use chrono::Duration;
use grocery_core::stock::{
    stale_cutoff, CommitOutcome, CommittedItem, FailedItem, ReleaseReport, ReleasedItem,
    ReservationOutcome, ReservedItem, StockBatch, StockLedger, StockLevel, StockLine,
};
use grocery_core::{BoxFuture, DateTime, ProductId, Result, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub(crate) struct LevelRow {
    id: Uuid,
    name: String,
    total_available_stock: i64,
    buying_in_progress: i64,
    last_reserved_at: Option<DateTime<Utc>>,
}

impl From<LevelRow> for StockLevel {
    fn from(row: LevelRow) -> Self {
        Self::new(
            ProductId::from_uuid(row.id),
            row.name,
            row.total_available_stock,
            row.buying_in_progress,
            row.last_reserved_at,
        )
    }
}

/// Column list for [`LevelRow`].
pub(crate) const LEVEL_COLUMNS: &str =
    "id, name, total_available_stock, buying_in_progress, last_reserved_at";

/// Read one product's counters on an existing connection.
pub(crate) async fn level_on(conn: &mut PgConnection, id: ProductId) -> Result<Option<StockLevel>> {
    let row: Option<LevelRow> =
        sqlx::query_as(&format!("SELECT {LEVEL_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage("read stock level"))?;
    Ok(row.map(StockLevel::from))
}

/// Line indices ordered by product id.
///
/// Applying guarded updates in a stable row order keeps two overlapping
/// batches from deadlocking each other.
fn lock_order(lines: &[StockLine]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lines.len()).collect();
    order.sort_by_key(|&index| lines[index].product_id);
    order
}

/// Apply the reservation guard for every line.
///
/// Evaluation continues past the first failure so the outcome names every
/// failing line. On `Rejected` the caller must roll back.
pub(crate) async fn reserve_in_tx(
    conn: &mut PgConnection,
    batch: &StockBatch,
    now: DateTime<Utc>,
) -> Result<ReservationOutcome> {
    let lines = batch.lines();
    let mut reserved: Vec<Option<ReservedItem>> = vec![None; lines.len()];
    let mut failed: Vec<Option<FailedItem>> = vec![None; lines.len()];

    for index in lock_order(lines) {
        let line = &lines[index];
        let row: Option<(i64, i64)> = sqlx::query_as(
            r"
            UPDATE products
            SET buying_in_progress = buying_in_progress + $2,
                last_reserved_at = $3
            WHERE id = $1
              AND total_available_stock - buying_in_progress >= $2
            RETURNING total_available_stock, buying_in_progress
            ",
        )
        .bind(line.product_id.as_uuid())
        .bind(line.units())
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("reserve stock"))?;

        match row {
            Some((total, in_progress)) => {
                reserved[index] = Some(ReservedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    buying_in_progress: in_progress,
                    available_now: total - in_progress,
                });
            }
            None => {
                let level = level_on(conn, line.product_id).await?;
                failed[index] = Some(FailedItem::reservation(line, level.as_ref()));
            }
        }
    }

    let failed: Vec<FailedItem> = failed.into_iter().flatten().collect();
    if failed.is_empty() {
        Ok(ReservationOutcome::Reserved(
            reserved.into_iter().flatten().collect(),
        ))
    } else {
        Ok(ReservationOutcome::Rejected(failed))
    }
}

/// Decrement counters with a floor of zero. Never rejects.
pub(crate) async fn release_in_tx(
    conn: &mut PgConnection,
    batch: &StockBatch,
) -> Result<ReleaseReport> {
    let lines = batch.lines();
    let mut released: Vec<Option<ReleasedItem>> = vec![None; lines.len()];
    let mut missing: Vec<Option<ProductId>> = vec![None; lines.len()];

    for index in lock_order(lines) {
        let line = &lines[index];
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE products
            SET buying_in_progress = GREATEST(0, buying_in_progress - $2)
            WHERE id = $1
            RETURNING buying_in_progress
            ",
        )
        .bind(line.product_id.as_uuid())
        .bind(line.units())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("release stock"))?;

        match row {
            Some((in_progress,)) => {
                released[index] = Some(ReleasedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    buying_in_progress: in_progress,
                });
            }
            None => missing[index] = Some(line.product_id),
        }
    }

    let mut missing_products: Vec<ProductId> = Vec::new();
    for id in missing.into_iter().flatten() {
        if !missing_products.contains(&id) {
            missing_products.push(id);
        }
    }

    Ok(ReleaseReport {
        released_items: released.into_iter().flatten().collect(),
        missing_products,
    })
}

/// Turn reservations into permanent deductions. On `Rejected` the caller
/// must roll back.
pub(crate) async fn commit_in_tx(
    conn: &mut PgConnection,
    batch: &StockBatch,
) -> Result<CommitOutcome> {
    let lines = batch.lines();
    let mut committed: Vec<Option<CommittedItem>> = vec![None; lines.len()];
    let mut failed: Vec<Option<FailedItem>> = vec![None; lines.len()];

    for index in lock_order(lines) {
        let line = &lines[index];
        let row: Option<(i64, i64)> = sqlx::query_as(
            r"
            UPDATE products
            SET total_available_stock = total_available_stock - $2,
                buying_in_progress = buying_in_progress - $2
            WHERE id = $1
              AND buying_in_progress >= $2
              AND total_available_stock >= $2
            RETURNING total_available_stock, buying_in_progress
            ",
        )
        .bind(line.product_id.as_uuid())
        .bind(line.units())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("commit stock"))?;

        match row {
            Some((total, in_progress)) => {
                committed[index] = Some(CommittedItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    total_available_stock: total,
                    buying_in_progress: in_progress,
                });
            }
            None => {
                let level = level_on(conn, line.product_id).await?;
                failed[index] = Some(FailedItem::commit(line, level.as_ref()));
            }
        }
    }

    let failed: Vec<FailedItem> = failed.into_iter().flatten().collect();
    if failed.is_empty() {
        Ok(CommitOutcome::Committed(
            committed.into_iter().flatten().collect(),
        ))
    } else {
        Ok(CommitOutcome::Rejected(failed))
    }
}

impl StockLedger for PostgresStore {
    #[tracing::instrument(skip(self, product_ids), fields(products = product_ids.len()))]
    fn lookup(&self, product_ids: Vec<ProductId>) -> BoxFuture<'_, Result<Vec<StockLevel>>> {
        Box::pin(async move {
            let uuids: Vec<Uuid> = product_ids.iter().map(|id| *id.as_uuid()).collect();
            let rows: Vec<LevelRow> = sqlx::query_as(&format!(
                "SELECT {LEVEL_COLUMNS} FROM products WHERE id = ANY($1)"
            ))
            .bind(uuids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("lookup stock"))?;

            let mut levels: Vec<StockLevel> = rows.into_iter().map(StockLevel::from).collect();
            // Request order, each product once
            let mut ordered = Vec::with_capacity(levels.len());
            for id in product_ids {
                if let Some(position) = levels.iter().position(|level| level.product_id == id) {
                    ordered.push(levels.swap_remove(position));
                }
            }
            Ok(ordered)
        })
    }

    #[tracing::instrument(skip(self, batch), fields(lines = batch.lines().len()))]
    fn reserve(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReservationOutcome>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage("begin reservation"))?;
            let outcome = reserve_in_tx(&mut tx, &batch, self.now()).await?;

            match &outcome {
                ReservationOutcome::Reserved(_) => {
                    tx.commit().await.map_err(storage("commit reservation"))?;
                }
                ReservationOutcome::Rejected(failed) => {
                    tx.rollback().await.map_err(storage("roll back reservation"))?;
                    tracing::warn!(failed = failed.len(), "Reservation batch rejected");
                }
            }
            Ok(outcome)
        })
    }

    #[tracing::instrument(skip(self, batch), fields(lines = batch.lines().len()))]
    fn release(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReleaseReport>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage("begin release"))?;
            let report = release_in_tx(&mut tx, &batch).await?;
            tx.commit().await.map_err(storage("commit release"))?;
            Ok(report)
        })
    }

    #[tracing::instrument(skip(self, batch), fields(lines = batch.lines().len()))]
    fn commit(&self, batch: StockBatch) -> BoxFuture<'_, Result<CommitOutcome>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage("begin stock commit"))?;
            let outcome = commit_in_tx(&mut tx, &batch).await?;

            match &outcome {
                CommitOutcome::Committed(_) => {
                    tx.commit().await.map_err(storage("commit stock commit"))?;
                }
                CommitOutcome::Rejected(failed) => {
                    tx.rollback().await.map_err(storage("roll back stock commit"))?;
                    tracing::warn!(failed = failed.len(), "Stock commit rejected");
                }
            }
            Ok(outcome)
        })
    }

    fn list_stuck(&self) -> BoxFuture<'_, Result<Vec<StockLevel>>> {
        Box::pin(async move {
            let rows: Vec<LevelRow> = sqlx::query_as(&format!(
                "SELECT {LEVEL_COLUMNS} FROM products
                 WHERE buying_in_progress > 0
                 ORDER BY buying_in_progress DESC, name"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list stuck reservations"))?;

            Ok(rows.into_iter().map(StockLevel::from).collect())
        })
    }

    #[tracing::instrument(skip(self))]
    fn reset_stuck(&self, older_than: Option<Duration>) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let cutoff = stale_cutoff(self.now(), older_than);
            let result = sqlx::query(
                r"
                UPDATE products
                SET buying_in_progress = 0
                WHERE buying_in_progress > 0
                  AND ($1::timestamptz IS NULL
                       OR last_reserved_at IS NULL
                       OR last_reserved_at < $1)
                ",
            )
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage("reset stuck reservations"))?;

            let reset = result.rows_affected();
            if reset > 0 {
                tracing::warn!(reset, ?cutoff, "Stuck reservations reset");
            }
            Ok(reset)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_sorts_by_product() {
        let a = ProductId::new();
        let b = ProductId::new();
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let lines = [StockLine::new(high, 1), StockLine::new(low, 1), StockLine::new(high, 2)];
        let order = lock_order(&lines);
        assert_eq!(order[0], 1);
        assert_eq!(lines[order[1]].product_id, high);
        assert_eq!(lines[order[2]].product_id, high);
    }
}
