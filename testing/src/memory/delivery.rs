use super::InMemoryStore;
use grocery_core::delivery::{
    Delivery, DeliveryEvent, DeliveryRepository, DeliveryStatus, NewDelivery, Tracking,
};
use grocery_core::orders::OrderStatus;
use grocery_core::{BoxFuture, DeliveryId, DomainError, OrderId, Result};

impl DeliveryRepository for InMemoryStore {
    fn create_delivery(&self, delivery: NewDelivery) -> BoxFuture<'_, Result<Delivery>> {
        Box::pin(async move {
            let delivery = delivery.validate()?;
            let now = self.now();
            let mut state = self.lock();

            let order = &state.orders[state.order_index(delivery.order_id)?];
            if order.status != OrderStatus::Paid {
                return Err(DomainError::conflict(format!(
                    "Only paid orders can be scheduled for delivery (order is {})",
                    order.status
                )));
            }
            if state
                .deliveries
                .iter()
                .any(|(existing, _)| existing.order_id == delivery.order_id)
            {
                return Err(DomainError::conflict(format!(
                    "Order {} already has a delivery",
                    delivery.order_id
                )));
            }

            let created = Delivery {
                id: DeliveryId::new(),
                order_id: delivery.order_id,
                courier: delivery.courier,
                status: DeliveryStatus::Scheduled,
                estimated_arrival: delivery.estimated_arrival,
                created_at: now,
                updated_at: now,
            };
            let scheduled = DeliveryEvent {
                status: DeliveryStatus::Scheduled,
                note: None,
                created_at: now,
            };
            state.deliveries.push((created.clone(), vec![scheduled]));
            Ok(created)
        })
    }

    fn update_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> BoxFuture<'_, Result<Delivery>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();

            let position = state
                .deliveries
                .iter()
                .position(|(delivery, _)| delivery.id == id)
                .ok_or_else(|| DomainError::not_found("Delivery", id))?;
            let current = &state.deliveries[position].0;
            current.status.ensure_transition(status)?;

            // The order moves with the parcel; check before mutating anything
            let order_index = if status == DeliveryStatus::Delivered {
                let index = state.order_index(current.order_id)?;
                let order_status = state.orders[index].status;
                if order_status != OrderStatus::Paid {
                    return Err(order_status.transition_error(OrderStatus::Delivered));
                }
                Some(index)
            } else {
                None
            };

            let (delivery, events) = &mut state.deliveries[position];
            delivery.status = status;
            delivery.updated_at = now;
            events.push(DeliveryEvent {
                status,
                note,
                created_at: now,
            });
            let updated = delivery.clone();

            if let Some(index) = order_index {
                state.set_order_status(index, OrderStatus::Delivered, now);
            }
            Ok(updated)
        })
    }

    fn tracking(&self, order: OrderId) -> BoxFuture<'_, Result<Tracking>> {
        Box::pin(async move {
            self.lock()
                .deliveries
                .iter()
                .find(|(delivery, _)| delivery.order_id == order)
                .map(|(delivery, events)| Tracking {
                    delivery: delivery.clone(),
                    events: events.clone(),
                })
                .ok_or_else(|| DomainError::not_found("Delivery for order", order))
        })
    }
}
