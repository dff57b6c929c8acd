//! Return requests and the customer wallet.
//!
//! Approving a return is the one multi-write money path in the service. In
//! one transaction it:
//!
//! 1. moves the request `pending -> approved` (guarded)
//! 2. appends a credit to the wallet ledger
//! 3. raises the cached wallet balance on the user
//! 4. optionally puts the returned units back on the shelf
//!
//! A failure at any step rolls back all four.

use crate::error::{DomainError, Result};
use crate::ids::{OrderId, ProductId, ReturnId, UserId, WalletTransactionId};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Return request lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Awaiting review
    Pending,
    /// Refunded to the wallet
    Approved,
    /// Declined
    Rejected,
}

impl ReturnStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether units in this request still count against the returnable
    /// quantity.
    #[must_use]
    pub const fn holds_quantity(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::validation(format!(
                "Unknown return status: {other}"
            ))),
        }
    }
}

/// Customer input for a return.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewReturn {
    /// Delivered order the product came from
    pub order_id: OrderId,
    /// Product being returned
    pub product_id: ProductId,
    /// Units being returned
    pub quantity: u32,
    /// Customer explanation
    pub reason: String,
}

impl NewReturn {
    /// Validate the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a zero quantity or blank reason.
    pub fn validate(mut self) -> Result<Self> {
        self.reason = self.reason.trim().to_string();
        if self.quantity == 0 {
            return Err(DomainError::validation("Quantity must be at least 1"));
        }
        if self.reason.is_empty() {
            return Err(DomainError::validation("A reason is required"));
        }
        Ok(self)
    }
}

/// Check a return against what was ordered and what is already being returned.
///
/// # Errors
///
/// Returns [`DomainError::Validation`] when `requested` exceeds the remaining
/// returnable quantity.
pub fn ensure_returnable(ordered: u32, already_returned: u32, requested: u32) -> Result<()> {
    let remaining = ordered.saturating_sub(already_returned);
    if requested > remaining {
        return Err(DomainError::validation(format!(
            "Only {remaining} unit(s) of this product can still be returned"
        )));
    }
    Ok(())
}

/// A return request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReturnRequest {
    /// Request identifier
    pub id: ReturnId,
    /// Customer
    pub user_id: UserId,
    /// Source order
    pub order_id: OrderId,
    /// Returned product
    pub product_id: ProductId,
    /// Returned units
    pub quantity: u32,
    /// Customer explanation
    pub reason: String,
    /// Lifecycle status
    pub status: ReturnStatus,
    /// Amount credited on approval
    pub refund_cents: i64,
    /// Reviewer note
    pub admin_note: Option<String>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Review time
    pub processed_at: Option<DateTime<Utc>>,
}

/// Reviewer decision details for an approval.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ApproveReturn {
    /// Put the returned units back into `total_available_stock`
    #[serde(default)]
    pub restock: bool,
    /// Reviewer note
    #[serde(default)]
    pub note: Option<String>,
}

/// Direction of a wallet movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionKind {
    /// Money added to the wallet
    Credit,
    /// Money taken from the wallet
    Debit,
}

impl WalletTransactionKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl FromStr for WalletTransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(DomainError::validation(format!(
                "Unknown wallet transaction kind: {other}"
            ))),
        }
    }
}

/// One wallet ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WalletTransaction {
    /// Entry identifier
    pub id: WalletTransactionId,
    /// Wallet owner
    pub user_id: UserId,
    /// Direction
    pub kind: WalletTransactionKind,
    /// Amount in cents (always positive)
    pub amount_cents: i64,
    /// Human-readable description
    pub description: String,
    /// Return that produced this entry
    pub return_id: Option<ReturnId>,
    /// Booking time
    pub created_at: DateTime<Utc>,
}

/// Refund description written to the wallet ledger.
#[must_use]
pub fn refund_description(request: &ReturnRequest) -> String {
    format!("Refund for return {} (order {})", request.id, request.order_id)
}

/// Wallet balance with its history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Wallet {
    /// Wallet owner
    pub user_id: UserId,
    /// Current balance
    pub balance_cents: i64,
    /// Entries, newest first
    pub transactions: Vec<WalletTransaction>,
}

/// Return and wallet storage.
pub trait ReturnRepository: Send + Sync {
    /// File a return for a delivered order.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the order does not exist or belongs to someone else
    /// - `Conflict`: the order has not been delivered
    /// - `Validation`: the product is not on the order or the quantity is too large
    /// - `Database`: storage failure
    fn request_return(&self, user: UserId, request: NewReturn)
    -> BoxFuture<'_, Result<ReturnRequest>>;

    /// The user's returns, newest first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_returns(&self, user: UserId) -> BoxFuture<'_, Result<Vec<ReturnRequest>>>;

    /// Every return, optionally by status, newest first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_all_returns(
        &self,
        status: Option<ReturnStatus>,
    ) -> BoxFuture<'_, Result<Vec<ReturnRequest>>>;

    /// Approve a pending return and credit the wallet.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such return
    /// - `Conflict`: the return is not pending
    /// - `Database`: storage failure
    fn approve_return(
        &self,
        id: ReturnId,
        decision: ApproveReturn,
    ) -> BoxFuture<'_, Result<ReturnRequest>>;

    /// Reject a pending return.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such return
    /// - `Conflict`: the return is not pending
    /// - `Database`: storage failure
    fn reject_return(&self, id: ReturnId, note: Option<String>)
    -> BoxFuture<'_, Result<ReturnRequest>>;

    /// The user's wallet.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such user
    /// - `Database`: storage failure
    fn get_wallet(&self, user: UserId) -> BoxFuture<'_, Result<Wallet>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returnable_quantity_accounts_for_open_returns() {
        assert!(ensure_returnable(3, 0, 3).is_ok());
        assert!(ensure_returnable(3, 2, 1).is_ok());
        assert!(ensure_returnable(3, 2, 2).is_err());
        assert!(ensure_returnable(1, 5, 1).is_err());
    }

    #[test]
    fn rejected_returns_free_their_quantity() {
        assert!(ReturnStatus::Pending.holds_quantity());
        assert!(ReturnStatus::Approved.holds_quantity());
        assert!(!ReturnStatus::Rejected.holds_quantity());
    }

    #[test]
    fn new_return_requires_reason() {
        let request = NewReturn {
            order_id: OrderId::new(),
            product_id: ProductId::new(),
            quantity: 1,
            reason: "   ".to_string(),
        };
        assert!(request.validate().is_err());
    }
}
