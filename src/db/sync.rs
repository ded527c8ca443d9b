//! Write-behind sync driver.
//!
//! Periodically pushes store deltas to PostgreSQL: pools and tokens are
//! upserted wholesale (small sets), trades are deduplicated against a
//! synced-id set, candles push only the trailing still-mutable buckets,
//! and price history advances a per-pool timestamp watermark. A failed
//! pass logs and retries next interval; the store is never blocked.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use crate::config::PostgresSettings;
use crate::db::PostgresClient;
use crate::store::{DataStore, PricePoint, Trade};

/// Synced trade ids kept before pruning against the store's residents.
const MAX_SYNCED_TRADE_IDS: usize = 100_000;

/// Trailing candles pushed per (pool, timeframe) series each delta pass.
const RECENT_CANDLES_PER_SERIES: usize = 3;

/// Tracks what has already been persisted between passes.
///
/// Kept separate from the database client so the dedup and watermark
/// logic is testable without a connection.
#[derive(Default)]
struct SyncState {
    synced_trade_ids: HashSet<String>,
    /// Pool address -> newest persisted price point timestamp
    price_watermarks: HashMap<String, i64>,
}

impl SyncState {
    /// Filter out trades already persisted and mark the rest as synced.
    fn take_unsynced(&mut self, trades: Vec<Trade>) -> Vec<Trade> {
        trades
            .into_iter()
            .filter(|t| self.synced_trade_ids.insert(t.id.clone()))
            .collect()
    }

    /// Put trades back into the unsynced pool after a failed insert so
    /// the next pass offers them again.
    fn requeue(&mut self, trades: &[Trade]) {
        for trade in trades {
            self.synced_trade_ids.remove(&trade.id);
        }
    }

    /// Price points newer than each pool's watermark; advances watermarks.
    fn take_new_price_points(
        &mut self,
        history: HashMap<String, Vec<PricePoint>>,
    ) -> Vec<(String, PricePoint)> {
        let mut out = Vec::new();
        for (pool, points) in history {
            let watermark = self.price_watermarks.get(&pool).copied().unwrap_or(i64::MIN);
            let mut newest = watermark;
            for point in points {
                if point.timestamp > watermark {
                    newest = newest.max(point.timestamp);
                    out.push((pool.clone(), point));
                }
            }
            if newest > watermark {
                self.price_watermarks.insert(pool, newest);
            }
        }
        out
    }

    /// Drop synced ids whose trades have already been evicted from the
    /// store; they can never be offered for sync again.
    fn prune(&mut self, resident_ids: &HashSet<String>) {
        if self.synced_trade_ids.len() > MAX_SYNCED_TRADE_IDS {
            self.synced_trade_ids.retain(|id| resident_ids.contains(id));
        }
    }
}

pub struct SyncLayer {
    db: PostgresClient,
    state: SyncState,
    sync_interval: Duration,
}

impl SyncLayer {
    pub fn new(db: PostgresClient, settings: &PostgresSettings) -> Self {
        Self {
            db,
            state: SyncState::default(),
            sync_interval: Duration::from_secs(settings.sync_interval_secs),
        }
    }

    /// Push the entire store once, then keep pushing deltas forever.
    pub async fn run(mut self, store: &DataStore) {
        if let Err(e) = self.sync_full(store).await {
            warn!("Initial full sync failed: {e:#}");
        }

        let mut ticker = tokio::time::interval(self.sync_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Sync layer started (every {}s)", self.sync_interval.as_secs());

        loop {
            ticker.tick().await;
            if let Err(e) = self.sync_delta(store).await {
                warn!("Delta sync failed, will retry next interval: {e:#}");
            }
        }
    }

    /// Full snapshot push: everything the store currently holds.
    pub async fn sync_full(&mut self, store: &DataStore) -> Result<()> {
        info!("Running full store sync to PostgreSQL");

        self.db.set_tokens(&store.all_tokens()).await?;
        self.db.set_pools(&store.all_pools()).await?;

        let trades = self.state.take_unsynced(store.all_trades());
        if let Err(e) = self.db.insert_trades(&trades).await {
            self.state.requeue(&trades);
            return Err(e);
        }

        self.db.set_candles(&store.all_candles()).await?;

        let points = self.state.take_new_price_points(store.price_history());
        self.db.set_price_points(&points).await?;

        self.db.set_stats(&store.stats()).await?;

        info!("Full sync complete ({} trades, {} price points)", trades.len(), points.len());
        Ok(())
    }

    /// Incremental push: changed pools/tokens/stats plus new trades,
    /// trailing candles, and new price points.
    pub async fn sync_delta(&mut self, store: &DataStore) -> Result<()> {
        self.db.set_tokens(&store.all_tokens()).await?;
        self.db.set_pools(&store.all_pools()).await?;

        let trades = self.state.take_unsynced(store.all_trades());
        if let Err(e) = self.db.insert_trades(&trades).await {
            self.state.requeue(&trades);
            return Err(e);
        }

        self.db
            .set_candles(&store.recent_candles(RECENT_CANDLES_PER_SERIES))
            .await?;

        let points = self.state.take_new_price_points(store.price_history());
        self.db.set_price_points(&points).await?;

        self.db.set_stats(&store.stats()).await?;

        self.state.prune(&store.resident_trade_ids());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SwapSide;

    fn test_trade(id: &str) -> Trade {
        Trade {
            id: id.to_string(),
            pool_address: "0xpool".to_string(),
            tx_hash: "0xtx".to_string(),
            block_number: 1,
            timestamp: 1_000_000,
            side: SwapSide::Buy,
            price: 1.0,
            amount_token: 1.0,
            amount_eth: 0.1,
            value_usd: 100.0,
            maker: "0xmaker".to_string(),
        }
    }

    #[test]
    fn test_take_unsynced_is_idempotent() {
        let mut state = SyncState::default();

        let first = state.take_unsynced(vec![test_trade("a"), test_trade("b")]);
        assert_eq!(first.len(), 2);

        // Same trades offered again: nothing to sync
        let second = state.take_unsynced(vec![test_trade("a"), test_trade("b")]);
        assert!(second.is_empty());

        // A new trade alongside old ones: only the new one passes
        let third = state.take_unsynced(vec![test_trade("a"), test_trade("c")]);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, "c");
    }

    #[test]
    fn test_requeue_offers_trades_again_after_failed_insert() {
        let mut state = SyncState::default();

        let taken = state.take_unsynced(vec![test_trade("a"), test_trade("b")]);
        assert_eq!(taken.len(), 2);

        // Insert failed: the ids go back to unsynced
        state.requeue(&taken);
        let retried = state.take_unsynced(vec![test_trade("a"), test_trade("b")]);
        assert_eq!(retried.len(), 2);
    }

    #[test]
    fn test_prune_keeps_resident_ids_only() {
        let mut state = SyncState::default();
        for i in 0..MAX_SYNCED_TRADE_IDS + 10 {
            state.synced_trade_ids.insert(format!("t{i}"));
        }

        let resident: HashSet<String> = (0..100).map(|i| format!("t{i}")).collect();
        state.prune(&resident);
        assert_eq!(state.synced_trade_ids.len(), 100);

        // Below the cap nothing is pruned
        state.prune(&HashSet::new());
        assert_eq!(state.synced_trade_ids.len(), 100);
    }

    #[test]
    fn test_price_watermark_advances() {
        let mut state = SyncState::default();

        let mut history = HashMap::new();
        history.insert(
            "0xpool".to_string(),
            vec![
                PricePoint { timestamp: 10, price: 1.0 },
                PricePoint { timestamp: 20, price: 2.0 },
            ],
        );

        let first = state.take_new_price_points(history.clone());
        assert_eq!(first.len(), 2);

        // Unchanged history yields nothing
        let second = state.take_new_price_points(history.clone());
        assert!(second.is_empty());

        // One new point past the watermark
        history
            .get_mut("0xpool")
            .unwrap()
            .push(PricePoint { timestamp: 30, price: 3.0 });
        let third = state.take_new_price_points(history);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].1.timestamp, 30);
    }
}
