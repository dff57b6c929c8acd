//! Ledger invariants under random operation sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use grocery_core::catalog::CatalogRepository;
use grocery_core::stock::{ReservationOutcome, StockLedger};
use grocery_core::ProductId;
use grocery_testing::properties::{ledger_op, resolve, LedgerOp};
use grocery_testing::InMemoryStore;
use proptest::prelude::*;

const PRODUCTS: usize = 3;

fn fixture() -> (InMemoryStore, Vec<ProductId>) {
    let store = InMemoryStore::new();
    let ids = ["Apples", "Bread", "Cheese"]
        .iter()
        .take(PRODUCTS)
        .map(|name| store.seed_product(name, 8, 100).id)
        .collect();
    (store, ids)
}

fn counters(store: &InMemoryStore) -> Vec<(i64, i64)> {
    store
        .levels()
        .iter()
        .map(|level| (level.total_available_stock, level.buying_in_progress))
        .collect()
}

async fn apply(store: &InMemoryStore, ids: &[ProductId], op: &LedgerOp) {
    match op {
        LedgerOp::Reserve(lines) => {
            let Some(batch) = resolve(lines, ids) else { return };
            let before = counters(store);
            let outcome = store.reserve(batch).await.unwrap();
            if let ReservationOutcome::Rejected(failed) = outcome {
                assert!(!failed.is_empty());
                assert_eq!(before, counters(store), "rejected batch must not change counters");
            }
        }
        LedgerOp::Release(lines) => {
            let Some(batch) = resolve(lines, ids) else { return };
            store.release(batch).await.unwrap();
        }
        LedgerOp::Commit(lines) => {
            let Some(batch) = resolve(lines, ids) else { return };
            store.commit(batch).await.unwrap();
        }
        LedgerOp::Restock(index, delta) => {
            // Guard violations are expected outcomes here
            let _ = store.restock(ids[*index], *delta).await;
        }
        LedgerOp::ResetStuck => {
            store.reset_stuck(None).await.unwrap();
            assert!(store.list_stuck().await.unwrap().is_empty());
        }
    }
}

proptest! {
    #[test]
    fn counters_stay_within_bounds(ops in prop::collection::vec(ledger_op(PRODUCTS), 1..40)) {
        tokio_test::block_on(async {
            let (store, ids) = fixture();
            for op in &ops {
                apply(&store, &ids, op).await;
                for level in store.levels() {
                    assert!(level.buying_in_progress >= 0, "{level:?}");
                    assert!(level.buying_in_progress <= level.total_available_stock, "{level:?}");
                    assert!(level.is_consistent());
                }
            }
        });
    }

    #[test]
    fn reserve_then_release_restores_counters(
        lines in grocery_testing::properties::indexed_lines(PRODUCTS, 3)
    ) {
        tokio_test::block_on(async {
            let (store, ids) = fixture();
            let before = counters(&store);
            let batch = resolve(&lines, &ids).unwrap();

            if store.reserve(batch.clone()).await.unwrap().is_reserved() {
                store.release(batch).await.unwrap();
            }
            assert_eq!(before, counters(&store));
        });
    }
}
