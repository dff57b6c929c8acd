//! Background reclamation of stale reservations.
//!
//! Off by default. When a reservation TTL is configured, a tokio task calls
//! [`StockLedger::reset_stuck`] with that age on every tick, so counters
//! left behind by crashed or abandoned checkouts are freed without wiping
//! reservations that are still in flight.

use crate::metrics;
use chrono::TimeDelta;
use grocery_core::stock::StockLedger;
use grocery_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reset every counter whose last reservation is older than `ttl`.
///
/// # Errors
///
/// Propagates storage failures from the ledger.
pub async fn sweep_once(ledger: &dyn StockLedger, ttl: TimeDelta) -> Result<u64> {
    let reset = ledger.reset_stuck(Some(ttl)).await?;
    if reset > 0 {
        tracing::warn!(
            reset,
            ttl_secs = ttl.num_seconds(),
            "Reclaimed stale stock reservations"
        );
        metrics::record_stuck_reset(reset);
    }
    Ok(reset)
}

/// Spawn the sweeper loop. Abort the handle to stop it.
pub fn spawn(ledger: Arc<dyn StockLedger>, ttl: TimeDelta, every: Duration) -> JoinHandle<()> {
    tracing::info!(
        ttl_secs = ttl.num_seconds(),
        interval_secs = every.as_secs(),
        "Starting stale-reservation sweeper"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_once(ledger.as_ref(), ttl).await {
                tracing::error!(error = %err, "Stale-reservation sweep failed");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use grocery_testing::helpers::batch;
    use grocery_testing::mocks::{test_instant, ManualClock};
    use grocery_testing::InMemoryStore;

    #[tokio::test]
    async fn only_aged_reservations_are_swept() {
        let clock = Arc::new(ManualClock::new(test_instant()));
        let store = InMemoryStore::with_clock(clock.clone());
        let old = store.seed_product("Milk", 10, 120);
        let fresh = store.seed_product("Eggs", 10, 300);

        store.reserve(batch(&[(old.id, 2)]).unwrap()).await.unwrap();
        clock.advance(TimeDelta::try_minutes(30).unwrap());
        store.reserve(batch(&[(fresh.id, 3)]).unwrap()).await.unwrap();

        let reset = sweep_once(&store, TimeDelta::try_minutes(15).unwrap())
            .await
            .unwrap();
        assert_eq!(reset, 1);

        let stuck = store.list_stuck().await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].product_id, fresh.id);
        assert_eq!(stuck[0].buying_in_progress, 3);
    }

    #[tokio::test]
    async fn nothing_to_sweep_is_zero() {
        let store = InMemoryStore::new();
        store.seed_product("Bread", 5, 250);
        let reset = sweep_once(&store, TimeDelta::try_minutes(1).unwrap())
            .await
            .unwrap();
        assert_eq!(reset, 0);
    }
}
