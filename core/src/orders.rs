//! Orders and checkout.
//!
//! Checkout is the main client of the stock ledger:
//!
//! ```text
//! place_order  -> reserve   (buying_in_progress += q)
//! confirm      -> commit    (total -= q, buying_in_progress -= q)
//! cancel       -> release   (buying_in_progress -= q, clamped)
//! ```
//!
//! Each step runs in the same transaction as the order's status change, so
//! an order and its reservation never disagree.

use crate::error::{DomainError, Result};
use crate::ids::{OrderId, ProductId, UserId};
use crate::stock::{FailedItem, StockBatch, StockLine};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Stock reserved, awaiting payment
    PendingPayment,
    /// Payment confirmed, stock deducted
    Paid,
    /// Handed to the customer
    Delivered,
    /// Abandoned before payment, reservation released
    Cancelled,
}

impl OrderStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the order may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingPayment, Self::Paid | Self::Cancelled) | (Self::Paid, Self::Delivered)
        )
    }

    /// Error for an attempted transition from this status.
    #[must_use]
    pub fn transition_error(self, next: Self) -> DomainError {
        DomainError::conflict(format!(
            "Order cannot move from {self} to {next}"
        ))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "Unknown order status: {other}"
            ))),
        }
    }
}

/// A purchased line with the price captured at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    /// Product identifier
    pub product_id: ProductId,
    /// Product name at checkout
    pub product_name: String,
    /// Units ordered
    pub quantity: u32,
    /// Unit price at checkout
    pub unit_price_cents: i64,
}

impl OrderItem {
    /// `unit_price_cents * quantity`
    #[must_use]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// An order with its items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Customer
    pub user_id: UserId,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Sum of item totals
    pub total_cents: i64,
    /// Purchased lines
    pub items: Vec<OrderItem>,
    /// Checkout time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Stock batch covering every item of this order.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if the order has no items.
    pub fn stock_batch(&self) -> Result<StockBatch> {
        StockBatch::new(
            self.items
                .iter()
                .map(|item| StockLine::new(item.product_id, item.quantity))
                .collect(),
        )
    }

    /// Reject callers that neither own the order nor administer the shop.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotFound`] so foreign order ids are not
    /// disclosed.
    pub fn ensure_visible_to(&self, user: UserId, is_admin: bool) -> Result<()> {
        if is_admin || self.user_id == user {
            Ok(())
        } else {
            Err(DomainError::not_found("Order", self.id))
        }
    }

    /// Quantity of `product` on this order (0 if absent).
    #[must_use]
    pub fn quantity_of(&self, product: ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| item.product_id == product)
            .map(|item| item.quantity)
            .sum()
    }
}

/// Sum of item totals.
#[must_use]
pub fn order_total(items: &[OrderItem]) -> i64 {
    items.iter().map(OrderItem::line_total_cents).sum()
}

/// Result of a checkout attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// Stock reserved, order created, cart cleared
    Placed(Order),
    /// At least one cart line could not be reserved; nothing changed
    Rejected(Vec<FailedItem>),
}

/// Order storage.
pub trait OrderRepository: Send + Sync {
    /// Check out the user's cart.
    ///
    /// # Errors
    ///
    /// - `Validation`: the cart is empty
    /// - `Database`: storage failure
    fn place_order(&self, user: UserId) -> BoxFuture<'_, Result<PlaceOrderOutcome>>;

    /// Record payment: `pending_payment -> paid` and commit the reservation.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for this user
    /// - `Conflict`: wrong status, or the reservation no longer matches
    /// - `Database`: storage failure
    fn confirm_order(&self, user: UserId, order: OrderId) -> BoxFuture<'_, Result<Order>>;

    /// Abandon checkout: `pending_payment -> cancelled` and release stock.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for this user
    /// - `Conflict`: wrong status
    /// - `Database`: storage failure
    fn cancel_order(&self, user: UserId, order: OrderId) -> BoxFuture<'_, Result<Order>>;

    /// Fetch one order regardless of owner.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order
    /// - `Database`: storage failure
    fn get_order(&self, order: OrderId) -> BoxFuture<'_, Result<Order>>;

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_orders(&self, user: UserId) -> BoxFuture<'_, Result<Vec<Order>>>;

    /// Every order, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_all_orders(&self, status: Option<OrderStatus>)
    -> BoxFuture<'_, Result<Vec<Order>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(user: UserId) -> Order {
        let items = vec![
            OrderItem {
                product_id: ProductId::new(),
                product_name: "Milk".to_string(),
                quantity: 2,
                unit_price_cents: 120,
            },
            OrderItem {
                product_id: ProductId::new(),
                product_name: "Eggs".to_string(),
                quantity: 1,
                unit_price_cents: 300,
            },
        ];
        Order {
            id: OrderId::new(),
            user_id: user,
            status: OrderStatus::PendingPayment,
            total_cents: order_total(&items),
            items,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_transitions() {
        use OrderStatus::{Cancelled, Delivered, Paid, PendingPayment};
        assert!(PendingPayment.can_transition_to(Paid));
        assert!(PendingPayment.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Delivered));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Delivered.can_transition_to(PendingPayment));
    }

    #[test]
    fn status_parses_storage_names() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::Paid,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn total_and_batch_follow_items() {
        let order = order(UserId::new());
        assert_eq!(order.total_cents, 540);
        let batch = order.stock_batch();
        assert!(matches!(batch, Ok(ref b) if b.total_units() == 3));
    }

    #[test]
    fn foreign_orders_are_hidden() {
        let owner = UserId::new();
        let order = order(owner);
        assert!(order.ensure_visible_to(owner, false).is_ok());
        assert!(order.ensure_visible_to(UserId::new(), true).is_ok());
        assert!(matches!(
            order.ensure_visible_to(UserId::new(), false),
            Err(DomainError::NotFound { .. })
        ));
    }
}
