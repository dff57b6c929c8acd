use super::{InMemoryStore, State};
use grocery_core::orders::{
    order_total, Order, OrderItem, OrderRepository, OrderStatus, PlaceOrderOutcome,
};
use grocery_core::stock::{CommitOutcome, ReservationOutcome, StockBatch, StockLine};
use grocery_core::{BoxFuture, DateTime, DomainError, OrderId, Result, UserId, Utc};

impl State {
    pub(super) fn order_index(&self, id: OrderId) -> Result<usize> {
        self.orders
            .iter()
            .position(|order| order.id == id)
            .ok_or_else(|| DomainError::not_found("Order", id))
    }

    /// Index of an order owned by `user` that may move to `to`.
    fn transition_target(&self, user: UserId, id: OrderId, to: OrderStatus) -> Result<usize> {
        let index = self.order_index(id)?;
        let order = &self.orders[index];
        order.ensure_visible_to(user, false)?;
        if !order.status.can_transition_to(to) {
            return Err(order.status.transition_error(to));
        }
        Ok(index)
    }

    pub(super) fn set_order_status(&mut self, index: usize, to: OrderStatus, now: DateTime<Utc>) {
        let order = &mut self.orders[index];
        order.status = to;
        order.updated_at = now;
    }
}

fn newest_first<'a>(orders: impl DoubleEndedIterator<Item = &'a Order>) -> Vec<Order> {
    orders.rev().cloned().collect()
}

impl OrderRepository for InMemoryStore {
    fn place_order(&self, user: UserId) -> BoxFuture<'_, Result<PlaceOrderOutcome>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();

            let cart = state.cart(user);
            if cart.is_empty() {
                return Err(DomainError::validation("Cart is empty"));
            }
            let batch = StockBatch::new(
                cart.lines
                    .iter()
                    .map(|line| StockLine::new(line.product_id, line.quantity))
                    .collect(),
            )?;
            if let ReservationOutcome::Rejected(failed) = state.reserve(&batch, now) {
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
            state.orders.push(order.clone());
            state.carts.remove(&user);
            Ok(PlaceOrderOutcome::Placed(order))
        })
    }

    fn confirm_order(&self, user: UserId, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();
            let index = state.transition_target(user, id, OrderStatus::Paid)?;

            let batch = state.orders[index].stock_batch()?;
            if let CommitOutcome::Rejected(_) = state.commit(&batch) {
                return Err(DomainError::conflict(format!(
                    "Reserved stock for order {id} no longer matches its items"
                )));
            }
            state.set_order_status(index, OrderStatus::Paid, now);
            Ok(state.orders[index].clone())
        })
    }

    fn cancel_order(&self, user: UserId, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();
            let index = state.transition_target(user, id, OrderStatus::Cancelled)?;

            let batch = state.orders[index].stock_batch()?;
            state.release(&batch);
            state.set_order_status(index, OrderStatus::Cancelled, now);
            Ok(state.orders[index].clone())
        })
    }

    fn get_order(&self, id: OrderId) -> BoxFuture<'_, Result<Order>> {
        Box::pin(async move {
            let state = self.lock();
            let index = state.order_index(id)?;
            Ok(state.orders[index].clone())
        })
    }

    fn list_orders(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(async move {
            let state = self.lock();
            Ok(newest_first(
                state.orders.iter().filter(|order| order.user_id == user),
            ))
        })
    }

    fn list_all_orders(&self, status: Option<OrderStatus>) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(async move {
            let state = self.lock();
            Ok(newest_first(
                state
                    .orders
                    .iter()
                    .filter(|order| status.is_none_or(|status| order.status == status)),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use grocery_core::cart::CartRepository;
    use grocery_core::stock::UnavailableReason;

    #[tokio::test]
    async fn checkout_reserves_and_confirm_commits() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let bread = store.seed_product("Bread", 4, 250);
        store.add_item(user, bread.id, 3).await.unwrap();

        let PlaceOrderOutcome::Placed(order) = store.place_order(user).await.unwrap() else {
            panic!("checkout should succeed");
        };
        assert_eq!(order.total_cents, 750);
        assert!(store.get_cart(user).await.unwrap().is_empty());
        assert_eq!(store.levels()[0].buying_in_progress, 3);

        let paid = store.confirm_order(user, order.id).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        let level = &store.levels()[0];
        assert_eq!((level.total_available_stock, level.buying_in_progress), (1, 0));
    }

    #[tokio::test]
    async fn rejected_checkout_keeps_cart_and_counters() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let eggs = store.seed_product("Eggs", 2, 300);
        store.add_item(user, eggs.id, 5).await.unwrap();

        let PlaceOrderOutcome::Rejected(failed) = store.place_order(user).await.unwrap() else {
            panic!("checkout should be rejected");
        };
        assert_eq!(failed[0].reason, UnavailableReason::ReservationConflict);
        assert_eq!(store.get_cart(user).await.unwrap().lines.len(), 1);
        assert_eq!(store.levels()[0].buying_in_progress, 0);
    }

    #[tokio::test]
    async fn foreign_orders_are_invisible() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let milk = store.seed_product("Milk", 4, 120);
        store.add_item(owner, milk.id, 1).await.unwrap();
        let PlaceOrderOutcome::Placed(order) = store.place_order(owner).await.unwrap() else {
            panic!("checkout should succeed");
        };

        let err = store.cancel_order(UserId::new(), order.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let cancelled = store.cancel_order(owner, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(store.levels()[0].buying_in_progress, 0);

        let err = store.confirm_order(owner, order.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
