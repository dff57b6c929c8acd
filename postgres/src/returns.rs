//! Return requests and wallet credits.

use crate::orders::order_on;
use crate::{quantity_param, storage, stored_quantity, PostgresStore};
use grocery_core::orders::OrderStatus;
use grocery_core::returns::{
    ensure_returnable, refund_description, ApproveReturn, NewReturn, ReturnRepository,
    ReturnRequest, ReturnStatus, Wallet, WalletTransaction, WalletTransactionKind,
};
use grocery_core::{
    BoxFuture, DateTime, DomainError, OrderId, ProductId, Result, ReturnId, UserId,
    Utc, WalletTransactionId,
};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    reason: String,
    status: String,
    refund_cents: i64,
    admin_note: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = DomainError;

    fn try_from(row: ReturnRow) -> Result<Self> {
        Ok(Self {
            id: ReturnId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            order_id: OrderId::from_uuid(row.order_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity: stored_quantity(row.quantity)?,
            reason: row.reason,
            status: row.status.parse()?,
            refund_cents: row.refund_cents,
            admin_note: row.admin_note,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    amount_cents: i64,
    description: String,
    return_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for WalletTransaction {
    type Error = DomainError;

    fn try_from(row: WalletRow) -> Result<Self> {
        Ok(Self {
            id: WalletTransactionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            kind: row.kind.parse()?,
            amount_cents: row.amount_cents,
            description: row.description,
            return_id: row.return_id.map(ReturnId::from_uuid),
            created_at: row.created_at,
        })
    }
}

const RETURN_COLUMNS: &str = "id, user_id, order_id, product_id, quantity, reason, status, \
     refund_cents, admin_note, created_at, processed_at";

fn into_requests(rows: Vec<ReturnRow>) -> Result<Vec<ReturnRequest>> {
    rows.into_iter().map(ReturnRequest::try_from).collect()
}

/// Guarded `pending -> status` update; `None` when the request is missing
/// or no longer pending.
async fn decide_on(
    conn: &mut PgConnection,
    id: ReturnId,
    status: ReturnStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<ReturnRequest>> {
    let row: Option<ReturnRow> = sqlx::query_as(&format!(
        "UPDATE returns
         SET status = $2, admin_note = $3, processed_at = $4
         WHERE id = $1 AND status = 'pending'
         RETURNING {RETURN_COLUMNS}"
    ))
    .bind(id.as_uuid())
    .bind(status.as_str())
    .bind(note)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage("decide return"))?;

    row.map(ReturnRequest::try_from).transpose()
}

/// Explain why a guarded decision did not apply.
async fn undecidable(conn: &mut PgConnection, id: ReturnId) -> DomainError {
    let current: std::result::Result<Option<(String,)>, _> =
        sqlx::query_as("SELECT status FROM returns WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await;
    match current {
        Ok(None) => DomainError::not_found("Return", id),
        Ok(Some((status,))) => {
            DomainError::conflict(format!("Return {id} is already {status}"))
        }
        Err(e) => storage("load return")(e),
    }
}

impl ReturnRepository for PostgresStore {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    fn request_return(
        &self,
        user: UserId,
        request: NewReturn,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let request = request.validate()?;
            let mut tx = self.pool.begin().await.map_err(storage("begin return request"))?;

            // Locking the order serializes concurrent requests against it
            let order = order_on(&mut tx, request.order_id, true)
                .await?
                .ok_or_else(|| DomainError::not_found("Order", request.order_id))?;
            order.ensure_visible_to(user, false)?;
            if order.status != OrderStatus::Delivered {
                return Err(DomainError::conflict(format!(
                    "Only delivered orders can be returned (order is {})",
                    order.status
                )));
            }

            let Some(item) = order
                .items
                .iter()
                .find(|item| item.product_id == request.product_id)
            else {
                return Err(DomainError::validation("Product is not part of this order"));
            };

            let (already,): (i64,) = sqlx::query_as(
                "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM returns
                 WHERE order_id = $1 AND product_id = $2 AND status <> 'rejected'",
            )
            .bind(request.order_id.as_uuid())
            .bind(request.product_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage("sum returned quantity"))?;
            let already = u32::try_from(already).unwrap_or(u32::MAX);
            ensure_returnable(item.quantity, already, request.quantity)?;

            let refund_cents = item.unit_price_cents * i64::from(request.quantity);
            let row: ReturnRow = sqlx::query_as(&format!(
                "INSERT INTO returns
                    (id, user_id, order_id, product_id, quantity, reason, status,
                     refund_cents, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
                 RETURNING {RETURN_COLUMNS}"
            ))
            .bind(ReturnId::new().as_uuid())
            .bind(user.as_uuid())
            .bind(request.order_id.as_uuid())
            .bind(request.product_id.as_uuid())
            .bind(quantity_param(request.quantity)?)
            .bind(&request.reason)
            .bind(refund_cents)
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage("insert return"))?;

            tx.commit().await.map_err(storage("commit return request"))?;
            let created = ReturnRequest::try_from(row)?;
            tracing::info!(return_id = %created.id, refund_cents, "Return requested");
            Ok(created)
        })
    }

    fn list_returns(&self, user: UserId) -> BoxFuture<'_, Result<Vec<ReturnRequest>>> {
        Box::pin(async move {
            let rows: Vec<ReturnRow> = sqlx::query_as(&format!(
                "SELECT {RETURN_COLUMNS} FROM returns WHERE user_id = $1
                 ORDER BY created_at DESC, id"
            ))
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list returns"))?;
            into_requests(rows)
        })
    }

    fn list_all_returns(
        &self,
        status: Option<ReturnStatus>,
    ) -> BoxFuture<'_, Result<Vec<ReturnRequest>>> {
        Box::pin(async move {
            let rows: Vec<ReturnRow> = sqlx::query_as(&format!(
                "SELECT {RETURN_COLUMNS} FROM returns
                 WHERE ($1::text IS NULL OR status = $1)
                 ORDER BY created_at DESC, id"
            ))
            .bind(status.map(ReturnStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list all returns"))?;
            into_requests(rows)
        })
    }

    #[tracing::instrument(skip(self, decision), fields(restock = decision.restock))]
    fn approve_return(
        &self,
        id: ReturnId,
        decision: ApproveReturn,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin approval"))?;

            // 1. Guarded status change
            let Some(approved) =
                decide_on(&mut tx, id, ReturnStatus::Approved, decision.note.as_deref(), now)
                    .await?
            else {
                return Err(undecidable(&mut tx, id).await);
            };

            // 2. Cached balance
            let credited = sqlx::query(
                "UPDATE users SET wallet_balance_cents = wallet_balance_cents + $2 WHERE id = $1",
            )
            .bind(approved.user_id.as_uuid())
            .bind(approved.refund_cents)
            .execute(&mut *tx)
            .await
            .map_err(storage("credit wallet"))?;
            if credited.rows_affected() == 0 {
                return Err(DomainError::not_found("User", approved.user_id));
            }

            // 3. Ledger entry
            if approved.refund_cents > 0 {
                sqlx::query(
                    "INSERT INTO wallet_transactions
                        (id, user_id, kind, amount_cents, description, return_id, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(WalletTransactionId::new().as_uuid())
                .bind(approved.user_id.as_uuid())
                .bind(WalletTransactionKind::Credit.as_str())
                .bind(approved.refund_cents)
                .bind(refund_description(&approved))
                .bind(approved.id.as_uuid())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(storage("insert wallet transaction"))?;
            }

            // 4. Back on the shelf
            if decision.restock {
                sqlx::query(
                    "UPDATE products SET total_available_stock = total_available_stock + $2
                     WHERE id = $1",
                )
                .bind(approved.product_id.as_uuid())
                .bind(i64::from(approved.quantity))
                .execute(&mut *tx)
                .await
                .map_err(storage("restock returned units"))?;
            }

            tx.commit().await.map_err(storage("commit approval"))?;
            tracing::info!(
                return_id = %id,
                refund_cents = approved.refund_cents,
                "Return approved"
            );
            Ok(approved)
        })
    }

    fn reject_return(
        &self,
        id: ReturnId,
        note: Option<String>,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage("acquire connection"))?;
            match decide_on(&mut conn, id, ReturnStatus::Rejected, note.as_deref(), self.now())
                .await?
            {
                Some(rejected) => Ok(rejected),
                None => Err(undecidable(&mut conn, id).await),
            }
        })
    }

    fn get_wallet(&self, user: UserId) -> BoxFuture<'_, Result<Wallet>> {
        Box::pin(async move {
            let balance: Option<(i64,)> =
                sqlx::query_as("SELECT wallet_balance_cents FROM users WHERE id = $1")
                    .bind(user.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage("load wallet balance"))?;
            let Some((balance_cents,)) = balance else {
                return Err(DomainError::not_found("User", user));
            };

            let rows: Vec<WalletRow> = sqlx::query_as(
                "SELECT id, user_id, kind, amount_cents, description, return_id, created_at
                 FROM wallet_transactions
                 WHERE user_id = $1
                 ORDER BY created_at DESC, id",
            )
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage("load wallet transactions"))?;

            Ok(Wallet {
                user_id: user,
                balance_cents,
                transactions: rows
                    .into_iter()
                    .map(WalletTransaction::try_from)
                    .collect::<Result<_>>()?,
            })
        })
    }
}
