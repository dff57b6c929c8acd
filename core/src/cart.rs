//! Per-user shopping carts.
//!
//! A cart is a plain wish list: adding items never touches the stock ledger.
//! Stock is only reserved at checkout.

use crate::error::{DomainError, Result};
use crate::ids::{ProductId, UserId};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// One product in a cart, priced at the current catalog price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartLine {
    /// Product identifier
    pub product_id: ProductId,
    /// Product display name
    pub name: String,
    /// Current unit price
    pub unit_price_cents: i64,
    /// Units in the cart
    pub quantity: u32,
    /// `unit_price_cents * quantity`
    pub line_total_cents: i64,
    /// Units reservable right now (informational)
    pub available_now: i64,
}

impl CartLine {
    /// Build a line, deriving the line total.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price_cents: i64,
        quantity: u32,
        available_now: i64,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price_cents,
            quantity,
            line_total_cents: unit_price_cents * i64::from(quantity),
            available_now,
        }
    }
}

/// A user's cart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    /// Owner
    pub user_id: UserId,
    /// Lines ordered by product name
    pub lines: Vec<CartLine>,
    /// Sum of line totals
    pub total_cents: i64,
}

impl Cart {
    /// Build a cart, deriving the total.
    #[must_use]
    pub fn new(user_id: UserId, lines: Vec<CartLine>) -> Self {
        let total_cents = lines.iter().map(|line| line.line_total_cents).sum();
        Self {
            user_id,
            lines,
            total_cents,
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Validate a quantity added to a cart.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] for zero or excessive quantities.
pub fn validate_add_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(DomainError::validation("Quantity must be at least 1"));
    }
    validate_set_quantity(quantity)
}

/// Validate a quantity set on a cart line (`0` removes the line).
///
/// # Errors
///
/// Returns [`DomainError::Validation`] for excessive quantities.
pub fn validate_set_quantity(quantity: u32) -> Result<()> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(DomainError::validation(format!(
            "Quantity must not exceed {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

/// Cart storage.
pub trait CartRepository: Send + Sync {
    /// The user's cart (empty if never used).
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn get_cart(&self, user: UserId) -> BoxFuture<'_, Result<Cart>>;

    /// Add units of an active product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// - `NotFound`: product missing or inactive
    /// - `Validation`: resulting quantity too large
    /// - `Database`: storage failure
    fn add_item(&self, user: UserId, product: ProductId, quantity: u32)
    -> BoxFuture<'_, Result<()>>;

    /// Overwrite a line's quantity; `0` removes it.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the cart has no such line
    /// - `Database`: storage failure
    fn set_quantity(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<()>>;

    /// Remove a line. Removing a missing line is not an error.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn remove_item(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>>;

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn clear(&self, user: UserId) -> BoxFuture<'_, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_derived() {
        let cart = Cart::new(
            UserId::new(),
            vec![
                CartLine::new(ProductId::new(), "Milk", 120, 2, 10),
                CartLine::new(ProductId::new(), "Bread", 250, 1, 4),
            ],
        );
        assert_eq!(cart.lines[0].line_total_cents, 240);
        assert_eq!(cart.total_cents, 490);
        assert!(!cart.is_empty());
    }

    #[test]
    fn quantity_rules() {
        assert!(validate_add_quantity(0).is_err());
        assert!(validate_add_quantity(1).is_ok());
        assert!(validate_set_quantity(0).is_ok());
        assert!(validate_set_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }
}
