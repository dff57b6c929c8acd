use super::{InMemoryStore, StoredProduct};
use chrono::Duration;
use grocery_core::stock::{
    stale_cutoff, CommitOutcome, ReleaseReport, ReservationOutcome, StockBatch, StockLedger,
    StockLevel,
};
use grocery_core::{BoxFuture, ProductId, Result};

impl StockLedger for InMemoryStore {
    fn lookup(&self, product_ids: Vec<ProductId>) -> BoxFuture<'_, Result<Vec<StockLevel>>> {
        Box::pin(async move {
            let state = self.lock();
            let mut seen = Vec::with_capacity(product_ids.len());
            let mut levels = Vec::with_capacity(product_ids.len());
            for id in product_ids {
                if seen.contains(&id) {
                    continue;
                }
                seen.push(id);
                if let Some(level) = state.level(id) {
                    levels.push(level);
                }
            }
            Ok(levels)
        })
    }

    fn reserve(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReservationOutcome>> {
        Box::pin(async move {
            let now = self.now();
            Ok(self.lock().reserve(&batch, now))
        })
    }

    fn release(&self, batch: StockBatch) -> BoxFuture<'_, Result<ReleaseReport>> {
        Box::pin(async move { Ok(self.lock().release(&batch)) })
    }

    fn commit(&self, batch: StockBatch) -> BoxFuture<'_, Result<CommitOutcome>> {
        Box::pin(async move { Ok(self.lock().commit(&batch)) })
    }

    fn list_stuck(&self) -> BoxFuture<'_, Result<Vec<StockLevel>>> {
        Box::pin(async move {
            let mut stuck: Vec<StockLevel> = self
                .lock()
                .products
                .iter()
                .filter(|stored| stored.product.buying_in_progress > 0)
                .map(StoredProduct::level)
                .collect();
            stuck.sort_by(|a, b| {
                b.buying_in_progress
                    .cmp(&a.buying_in_progress)
                    .then_with(|| a.product_name.cmp(&b.product_name))
            });
            Ok(stuck)
        })
    }

    fn reset_stuck(&self, older_than: Option<Duration>) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let cutoff = stale_cutoff(self.now(), older_than);
            let mut reset = 0;
            for stored in &mut self.lock().products {
                if stored.level().is_stale(cutoff) {
                    stored.product.buying_in_progress = 0;
                    reset += 1;
                }
            }
            Ok(reset)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::helpers::batch;
    use crate::ManualClock;
    use crate::mocks::test_instant;
    use grocery_core::stock::UnavailableReason;
    use std::sync::Arc;

    #[tokio::test]
    async fn duplicate_lines_accumulate() {
        let store = InMemoryStore::new();
        let apples = store.seed_product("Apples", 5, 50);

        let outcome = store
            .reserve(batch(&[(apples.id, 3), (apples.id, 3)]).unwrap())
            .await
            .unwrap();

        let ReservationOutcome::Rejected(failed) = outcome else {
            panic!("second line must not fit");
        };
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].available, 2);
        assert_eq!(failed[0].reason, UnavailableReason::ReservationConflict);
        assert_eq!(store.levels()[0].buying_in_progress, 0);
    }

    #[tokio::test]
    async fn lookup_skips_unknown_and_repeats() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 1, 1);
        let b = store.seed_product("B", 1, 1);

        let levels = store
            .lookup(vec![b.id, ProductId::new(), a.id, b.id])
            .await
            .unwrap();
        let ids: Vec<_> = levels.iter().map(|level| level.product_id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn aged_reset_only_touches_old_reservations() {
        let clock = ManualClock::new(test_instant());
        let store = InMemoryStore::with_clock(Arc::new(clock.clone()));
        let old = store.seed_product("Old", 10, 1);
        let fresh = store.seed_product("Fresh", 10, 1);

        store.reserve(batch(&[(old.id, 2)]).unwrap()).await.unwrap();
        clock.advance(Duration::minutes(20));
        store.reserve(batch(&[(fresh.id, 2)]).unwrap()).await.unwrap();

        let reset = store.reset_stuck(Some(Duration::minutes(15))).await.unwrap();
        assert_eq!(reset, 1);

        let stuck = store.list_stuck().await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].product_id, fresh.id);
    }
}
