use super::{InMemoryStore, State};
use grocery_core::warehouse::{
    insufficient_source_stock, NewWarehouse, Transfer, TransferRequest, Warehouse,
    WarehouseRepository, WarehouseStock,
};
use grocery_core::{BoxFuture, DomainError, ProductId, Result, TransferId, WarehouseId};

impl State {
    fn is_leading(&self, id: WarehouseId) -> Result<bool> {
        self.warehouses
            .iter()
            .find(|warehouse| warehouse.id == id)
            .map(|warehouse| warehouse.is_leading)
            .ok_or_else(|| DomainError::not_found("Warehouse", id))
    }

    /// Units a warehouse can give away. For the leading warehouse reserved
    /// units stay put.
    fn transferable(&self, warehouse: WarehouseId, leading: bool, product: ProductId) -> i64 {
        if leading {
            self.product(product)
                .map_or(0, |stored| stored.product.available_now())
        } else {
            self.warehouse_stock
                .get(&(warehouse, product))
                .copied()
                .unwrap_or(0)
        }
    }

    fn adjust(&mut self, warehouse: WarehouseId, leading: bool, product: ProductId, delta: i64) {
        if leading {
            if let Some(stored) = self.product_mut(product) {
                stored.product.total_available_stock += delta;
            }
        } else {
            *self.warehouse_stock.entry((warehouse, product)).or_default() += delta;
        }
    }
}

impl WarehouseRepository for InMemoryStore {
    fn list_warehouses(&self) -> BoxFuture<'_, Result<Vec<Warehouse>>> {
        Box::pin(async move {
            let mut warehouses = self.lock().warehouses.clone();
            warehouses.sort_by(|a, b| {
                b.is_leading
                    .cmp(&a.is_leading)
                    .then_with(|| a.name.cmp(&b.name))
            });
            Ok(warehouses)
        })
    }

    fn create_warehouse(&self, warehouse: NewWarehouse) -> BoxFuture<'_, Result<Warehouse>> {
        Box::pin(async move {
            let created = Warehouse {
                id: WarehouseId::new(),
                name: warehouse.name,
                location: warehouse.location,
                is_leading: false,
                created_at: self.now(),
            };
            self.lock().warehouses.push(created.clone());
            Ok(created)
        })
    }

    fn warehouse_inventory(&self, id: WarehouseId) -> BoxFuture<'_, Result<Vec<WarehouseStock>>> {
        Box::pin(async move {
            let state = self.lock();
            let leading = state.is_leading(id)?;

            let mut stock: Vec<WarehouseStock> = state
                .products
                .iter()
                .map(|stored| WarehouseStock {
                    product_id: stored.product.id,
                    product_name: stored.product.name.clone(),
                    quantity: if leading {
                        stored.product.total_available_stock
                    } else {
                        state
                            .warehouse_stock
                            .get(&(id, stored.product.id))
                            .copied()
                            .unwrap_or(0)
                    },
                })
                .filter(|entry| entry.quantity > 0)
                .collect();
            stock.sort_by(|a, b| {
                a.product_name
                    .cmp(&b.product_name)
                    .then_with(|| a.product_id.cmp(&b.product_id))
            });
            Ok(stock)
        })
    }

    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<Transfer>> {
        Box::pin(async move {
            let request = request.validate()?;
            let units = i64::from(request.quantity);
            let now = self.now();
            let mut state = self.lock();

            let from_leading = state.is_leading(request.from_warehouse_id)?;
            let to_leading = state.is_leading(request.to_warehouse_id)?;
            if state.product(request.product_id).is_none() {
                return Err(DomainError::not_found("Product", request.product_id));
            }
            if state.transferable(request.from_warehouse_id, from_leading, request.product_id)
                < units
            {
                return Err(insufficient_source_stock(&request));
            }

            state.adjust(request.from_warehouse_id, from_leading, request.product_id, -units);
            state.adjust(request.to_warehouse_id, to_leading, request.product_id, units);

            let transfer = Transfer {
                id: TransferId::new(),
                from_warehouse_id: request.from_warehouse_id,
                to_warehouse_id: request.to_warehouse_id,
                product_id: request.product_id,
                quantity: request.quantity,
                created_at: now,
            };
            state.transfers.push(transfer.clone());
            Ok(transfer)
        })
    }

    fn list_transfers(&self, limit: u32) -> BoxFuture<'_, Result<Vec<Transfer>>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .transfers
                .iter()
                .rev()
                .take(limit.max(1) as usize)
                .cloned()
                .collect())
        })
    }
}
