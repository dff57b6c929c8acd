use super::{InMemoryStore, State};
use grocery_core::orders::OrderStatus;
use grocery_core::returns::{
    ensure_returnable, refund_description, ApproveReturn, NewReturn, ReturnRepository,
    ReturnRequest, ReturnStatus, Wallet, WalletTransaction, WalletTransactionKind,
};
use grocery_core::{
    BoxFuture, DomainError, Result, ReturnId, UserId, WalletTransactionId,
};

impl State {
    /// Index of a return that is still pending.
    fn pending_return(&self, id: ReturnId) -> Result<usize> {
        let index = self
            .returns
            .iter()
            .position(|request| request.id == id)
            .ok_or_else(|| DomainError::not_found("Return", id))?;
        let status = self.returns[index].status;
        if status != ReturnStatus::Pending {
            return Err(DomainError::conflict(format!("Return {id} is already {status}")));
        }
        Ok(index)
    }
}

impl ReturnRepository for InMemoryStore {
    fn request_return(
        &self,
        user: UserId,
        request: NewReturn,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let request = request.validate()?;
            let now = self.now();
            let mut state = self.lock();

            let order = &state.orders[state.order_index(request.order_id)?];
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

            let already: u32 = state
                .returns
                .iter()
                .filter(|existing| {
                    existing.order_id == request.order_id
                        && existing.product_id == request.product_id
                        && existing.status.holds_quantity()
                })
                .map(|existing| existing.quantity)
                .sum();
            ensure_returnable(item.quantity, already, request.quantity)?;

            let created = ReturnRequest {
                id: ReturnId::new(),
                user_id: user,
                order_id: request.order_id,
                product_id: request.product_id,
                quantity: request.quantity,
                refund_cents: item.unit_price_cents * i64::from(request.quantity),
                reason: request.reason,
                status: ReturnStatus::Pending,
                admin_note: None,
                created_at: now,
                processed_at: None,
            };
            state.returns.push(created.clone());
            Ok(created)
        })
    }

    fn list_returns(&self, user: UserId) -> BoxFuture<'_, Result<Vec<ReturnRequest>>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .returns
                .iter()
                .rev()
                .filter(|request| request.user_id == user)
                .cloned()
                .collect())
        })
    }

    fn list_all_returns(
        &self,
        status: Option<ReturnStatus>,
    ) -> BoxFuture<'_, Result<Vec<ReturnRequest>>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .returns
                .iter()
                .rev()
                .filter(|request| status.is_none_or(|status| request.status == status))
                .cloned()
                .collect())
        })
    }

    fn approve_return(
        &self,
        id: ReturnId,
        decision: ApproveReturn,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();
            let index = state.pending_return(id)?;
            let (owner, refund_cents) = {
                let request = &state.returns[index];
                (request.user_id, request.refund_cents)
            };
            let Some(credentials) = state
                .users
                .iter_mut()
                .find(|credentials| credentials.user.id == owner)
            else {
                return Err(DomainError::not_found("User", owner));
            };
            credentials.user.wallet_balance_cents += refund_cents;

            let approved = {
                let request = &mut state.returns[index];
                request.status = ReturnStatus::Approved;
                request.admin_note = decision.note;
                request.processed_at = Some(now);
                request.clone()
            };

            if refund_cents > 0 {
                state.wallet.push(WalletTransaction {
                    id: WalletTransactionId::new(),
                    user_id: owner,
                    kind: WalletTransactionKind::Credit,
                    amount_cents: refund_cents,
                    description: refund_description(&approved),
                    return_id: Some(approved.id),
                    created_at: now,
                });
            }
            if decision.restock {
                if let Some(stored) = state.product_mut(approved.product_id) {
                    stored.product.total_available_stock += i64::from(approved.quantity);
                }
            }
            Ok(approved)
        })
    }

    fn reject_return(
        &self,
        id: ReturnId,
        note: Option<String>,
    ) -> BoxFuture<'_, Result<ReturnRequest>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();
            let index = state.pending_return(id)?;
            let request = &mut state.returns[index];
            request.status = ReturnStatus::Rejected;
            request.admin_note = note;
            request.processed_at = Some(now);
            Ok(request.clone())
        })
    }

    fn get_wallet(&self, user: UserId) -> BoxFuture<'_, Result<Wallet>> {
        Box::pin(async move {
            let state = self.lock();
            let Some(credentials) = state
                .users
                .iter()
                .find(|credentials| credentials.user.id == user)
            else {
                return Err(DomainError::not_found("User", user));
            };
            Ok(Wallet {
                user_id: user,
                balance_cents: credentials.user.wallet_balance_cents,
                transactions: state
                    .wallet
                    .iter()
                    .rev()
                    .filter(|transaction| transaction.user_id == user)
                    .cloned()
                    .collect(),
            })
        })
    }
}
