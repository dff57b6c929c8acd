//! Warehouses and stock transfers.
//!
//! The leading warehouse has no inventory table of its own: its stock is the
//! ledger's `total_available_stock`. Moving units out of it is guarded by
//! `total_available_stock - buying_in_progress >= quantity` so reserved units
//! can never leave the building.

use crate::error::{DomainError, Result};
use crate::ids::{ProductId, TransferId, WarehouseId};
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the leading warehouse seeded by the initial migration.
pub const LEADING_WAREHOUSE_ID: WarehouseId =
    WarehouseId::from_uuid(Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001));

/// Default page size for transfer history.
pub const DEFAULT_TRANSFER_LIMIT: u32 = 50;

/// A stocking location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Warehouse {
    /// Warehouse identifier
    pub id: WarehouseId,
    /// Display name
    pub name: String,
    /// Address or region
    pub location: String,
    /// Whether this warehouse backs the sellable ledger
    pub is_leading: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Admin input for a new (non-leading) warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewWarehouse {
    /// Display name
    pub name: String,
    /// Address or region
    #[serde(default)]
    pub location: String,
}

impl NewWarehouse {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a blank name.
    pub fn validate(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.location = self.location.trim().to_string();
        if self.name.is_empty() {
            return Err(DomainError::validation("Warehouse name must not be empty"));
        }
        Ok(self)
    }
}

/// Units of one product held in a warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WarehouseStock {
    /// Product identifier
    pub product_id: ProductId,
    /// Product display name
    pub product_name: String,
    /// Units on hand
    pub quantity: i64,
}

/// Request to move units between warehouses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TransferRequest {
    /// Source warehouse
    pub from_warehouse_id: WarehouseId,
    /// Destination warehouse
    pub to_warehouse_id: WarehouseId,
    /// Product moved
    pub product_id: ProductId,
    /// Units moved
    pub quantity: u32,
}

impl TransferRequest {
    /// Validate the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] for a zero quantity or identical
    /// source and destination.
    pub fn validate(self) -> Result<Self> {
        if self.quantity == 0 {
            return Err(DomainError::validation("Quantity must be at least 1"));
        }
        if self.from_warehouse_id == self.to_warehouse_id {
            return Err(DomainError::validation(
                "Source and destination warehouses must differ",
            ));
        }
        Ok(self)
    }
}

/// A completed transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transfer {
    /// Transfer identifier
    pub id: TransferId,
    /// Source warehouse
    pub from_warehouse_id: WarehouseId,
    /// Destination warehouse
    pub to_warehouse_id: WarehouseId,
    /// Product moved
    pub product_id: ProductId,
    /// Units moved
    pub quantity: u32,
    /// Completion time
    pub created_at: DateTime<Utc>,
}

/// Conflict raised when the source cannot cover a transfer.
#[must_use]
pub fn insufficient_source_stock(request: &TransferRequest) -> DomainError {
    DomainError::conflict(format!(
        "Warehouse {} cannot supply {} unit(s) of product {}",
        request.from_warehouse_id, request.quantity, request.product_id
    ))
}

/// Warehouse storage.
pub trait WarehouseRepository: Send + Sync {
    /// Every warehouse, leading first then by name.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_warehouses(&self) -> BoxFuture<'_, Result<Vec<Warehouse>>>;

    /// Create a non-leading warehouse.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn create_warehouse(&self, warehouse: NewWarehouse) -> BoxFuture<'_, Result<Warehouse>>;

    /// Stock held in a warehouse, by product name.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such warehouse
    /// - `Database`: storage failure
    fn warehouse_inventory(&self, id: WarehouseId)
    -> BoxFuture<'_, Result<Vec<WarehouseStock>>>;

    /// Move units atomically.
    ///
    /// # Errors
    ///
    /// - `NotFound`: unknown warehouse or product
    /// - `Conflict`: the source cannot cover the quantity
    /// - `Database`: storage failure
    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<Transfer>>;

    /// Most recent transfers first.
    ///
    /// # Errors
    ///
    /// - `Database`: storage failure
    fn list_transfers(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Transfer>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_requires_distinct_warehouses() {
        let request = TransferRequest {
            from_warehouse_id: LEADING_WAREHOUSE_ID,
            to_warehouse_id: LEADING_WAREHOUSE_ID,
            product_id: ProductId::new(),
            quantity: 1,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn transfer_requires_positive_quantity() {
        let request = TransferRequest {
            from_warehouse_id: LEADING_WAREHOUSE_ID,
            to_warehouse_id: WarehouseId::new(),
            product_id: ProductId::new(),
            quantity: 0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn leading_warehouse_id_is_stable() {
        assert_eq!(
            LEADING_WAREHOUSE_ID.to_string(),
            "00000000-0000-4000-8000-000000000001"
        );
    }
}
