use super::{InMemoryStore, State};
use grocery_core::cart::{
    validate_add_quantity, validate_set_quantity, Cart, CartLine, CartRepository,
    MAX_LINE_QUANTITY,
};
use grocery_core::{BoxFuture, DomainError, ProductId, Result, UserId};

impl State {
    /// The user's cart joined with live product data, ordered by name.
    pub(super) fn cart(&self, user: UserId) -> Cart {
        let mut lines: Vec<CartLine> = self
            .carts
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|&(product_id, quantity)| {
                self.product(product_id).map(|stored| {
                    CartLine::new(
                        product_id,
                        stored.product.name.clone(),
                        stored.product.price_cents,
                        quantity,
                        stored.product.available_now(),
                    )
                })
            })
            .collect();
        lines.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        Cart::new(user, lines)
    }
}

impl CartRepository for InMemoryStore {
    fn get_cart(&self, user: UserId) -> BoxFuture<'_, Result<Cart>> {
        Box::pin(async move { Ok(self.lock().cart(user)) })
    }

    fn add_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            validate_add_quantity(quantity)?;
            let mut state = self.lock();
            if !state
                .product(product)
                .is_some_and(|stored| stored.product.is_active)
            {
                return Err(DomainError::not_found("Product", product));
            }

            let lines = state.carts.entry(user).or_default();
            match lines.iter_mut().find(|(id, _)| *id == product) {
                Some((_, current)) => {
                    let merged = current.saturating_add(quantity);
                    if merged > MAX_LINE_QUANTITY {
                        return Err(DomainError::validation(format!(
                            "Quantity must not exceed {MAX_LINE_QUANTITY}"
                        )));
                    }
                    *current = merged;
                }
                None => lines.push((product, quantity)),
            }
            Ok(())
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
            let mut state = self.lock();
            let lines = state.carts.entry(user).or_default();
            let Some(position) = lines.iter().position(|(id, _)| *id == product) else {
                return Err(DomainError::not_found("Cart item", product));
            };
            if quantity == 0 {
                lines.remove(position);
            } else {
                lines[position].1 = quantity;
            }
            Ok(())
        })
    }

    fn remove_item(&self, user: UserId, product: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(lines) = self.lock().carts.get_mut(&user) {
                lines.retain(|(id, _)| *id != product);
            }
            Ok(())
        })
    }

    fn clear(&self, user: UserId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lock().carts.remove(&user);
            Ok(())
        })
    }
}
