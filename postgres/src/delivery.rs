use crate::orders::{order_on, transition_on};
use crate::{is_unique_violation, storage, PostgresStore};
use grocery_core::delivery::{
    Delivery, DeliveryEvent, DeliveryRepository, DeliveryStatus, NewDelivery, Tracking,
};
use grocery_core::orders::OrderStatus;
use grocery_core::{BoxFuture, DateTime, DeliveryId, DomainError, OrderId, Result, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    order_id: Uuid,
    courier: String,
    status: String,
    estimated_arrival: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = DomainError;

    fn try_from(row: DeliveryRow) -> Result<Self> {
        Ok(Self {
            id: DeliveryId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            courier: row.courier,
            status: row.status.parse()?,
            estimated_arrival: row.estimated_arrival,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const DELIVERY_COLUMNS: &str =
    "id, order_id, courier, status, estimated_arrival, created_at, updated_at";

async fn record_event(
    conn: &mut PgConnection,
    delivery: DeliveryId,
    status: DeliveryStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO delivery_events (delivery_id, status, note, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(delivery.as_uuid())
    .bind(status.as_str())
    .bind(note)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(storage("record delivery event"))?;
    Ok(())
}

impl DeliveryRepository for PostgresStore {
    #[tracing::instrument(skip(self, delivery), fields(order_id = %delivery.order_id))]
    fn create_delivery(&self, delivery: NewDelivery) -> BoxFuture<'_, Result<Delivery>> {
        Box::pin(async move {
            let delivery = delivery.validate()?;
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin delivery"))?;

            let order = order_on(&mut tx, delivery.order_id, true)
                .await?
                .ok_or_else(|| DomainError::not_found("Order", delivery.order_id))?;
            if order.status != OrderStatus::Paid {
                return Err(DomainError::conflict(format!(
                    "Only paid orders can be scheduled for delivery (order is {})",
                    order.status
                )));
            }

            let inserted: std::result::Result<DeliveryRow, sqlx::Error> =
                sqlx::query_as(&format!(
                    "INSERT INTO deliveries
                        (id, order_id, courier, status, estimated_arrival, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $6)
                     RETURNING {DELIVERY_COLUMNS}"
                ))
                .bind(DeliveryId::new().as_uuid())
                .bind(delivery.order_id.as_uuid())
                .bind(&delivery.courier)
                .bind(DeliveryStatus::Scheduled.as_str())
                .bind(delivery.estimated_arrival)
                .bind(now)
                .fetch_one(&mut *tx)
                .await;

            let row = match inserted {
                Ok(row) => row,
                Err(e) if is_unique_violation(&e) => {
                    return Err(DomainError::conflict(format!(
                        "Order {} already has a delivery",
                        delivery.order_id
                    )));
                }
                Err(e) => return Err(storage("insert delivery")(e)),
            };
            let created = Delivery::try_from(row)?;

            record_event(&mut tx, created.id, DeliveryStatus::Scheduled, None, now).await?;
            tx.commit().await.map_err(storage("commit delivery"))?;

            tracing::info!(delivery_id = %created.id, "Delivery scheduled");
            Ok(created)
        })
    }

    #[tracing::instrument(skip(self, note))]
    fn update_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> BoxFuture<'_, Result<Delivery>> {
        Box::pin(async move {
            let now = self.now();
            let mut tx = self.pool.begin().await.map_err(storage("begin delivery update"))?;

            let row: Option<DeliveryRow> = sqlx::query_as(&format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("load delivery"))?;
            let mut delivery = row
                .map(Delivery::try_from)
                .transpose()?
                .ok_or_else(|| DomainError::not_found("Delivery", id))?;

            delivery.status.ensure_transition(status)?;

            sqlx::query("UPDATE deliveries SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(status.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(storage("update delivery"))?;
            record_event(&mut tx, id, status, note.as_deref(), now).await?;

            if status == DeliveryStatus::Delivered {
                transition_on(
                    &mut tx,
                    delivery.order_id,
                    OrderStatus::Paid,
                    OrderStatus::Delivered,
                    now,
                )
                .await?;
            }

            tx.commit().await.map_err(storage("commit delivery update"))?;
            delivery.status = status;
            delivery.updated_at = now;
            tracing::info!(status = %status, "Delivery status updated");
            Ok(delivery)
        })
    }

    fn tracking(&self, order: OrderId) -> BoxFuture<'_, Result<Tracking>> {
        Box::pin(async move {
            let row: Option<DeliveryRow> = sqlx::query_as(&format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1"
            ))
            .bind(order.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load delivery"))?;
            let delivery = row
                .map(Delivery::try_from)
                .transpose()?
                .ok_or_else(|| DomainError::not_found("Delivery for order", order))?;

            let events: Vec<(String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
                "SELECT status, note, created_at FROM delivery_events
                 WHERE delivery_id = $1
                 ORDER BY id",
            )
            .bind(delivery.id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(storage("load delivery events"))?;

            let events = events
                .into_iter()
                .map(|(status, note, created_at)| {
                    Ok(DeliveryEvent {
                        status: status.parse()?,
                        note,
                        created_at,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Tracking { delivery, events })
        })
    }
}
