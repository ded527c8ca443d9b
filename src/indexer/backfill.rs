//! Phase 3: recent swap backfill.
//!
//! Replays a trailing block window of Swap events for every discovered
//! pool so the store has trade history, candles, and price changes
//! immediately after startup. Pools are queried in bounded parallel
//! groups; a pool whose query fails is skipped, not fatal.

use std::sync::Arc;

use alloy::{primitives::Address, sol_types::SolEvent};
use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};

use crate::abis::kumbaya;
use crate::chain::ChainClient;
use crate::config::IndexerSettings;
use crate::indexer::discovery::PoolCreatedRecord;
use crate::indexer::swaps::{trade_from_swap, weth_position};
use crate::indexer::MAX_LOGGED_ERRORS_PER_PASS;
use crate::store::DataStore;

pub struct SwapBackfiller {
    chain: Arc<ChainClient>,
    weth: String,
    backfill_blocks: u64,
    parallelism: usize,
}

impl SwapBackfiller {
    pub fn new(chain: Arc<ChainClient>, settings: &IndexerSettings) -> Self {
        Self {
            chain,
            weth: settings.weth_address.to_lowercase(),
            backfill_blocks: settings.backfill_blocks,
            parallelism: settings.backfill_parallelism.max(1),
        }
    }

    pub async fn run(&self, store: &DataStore, records: &[PoolCreatedRecord]) -> Result<()> {
        let head = self.chain.block_number().await?;
        let from = head.saturating_sub(self.backfill_blocks);
        info!(
            "Phase 3: backfilling swaps for {} pools over blocks {from}-{head}...",
            records.len()
        );

        let now_secs = Utc::now().timestamp();
        let eth_usd = store.eth_price_usd();
        let mut trades_added = 0usize;
        let mut pools_failed = 0usize;

        // Pools without a WETH leg cannot be priced in USD and are skipped
        let priced: Vec<(&PoolCreatedRecord, bool)> = records
            .iter()
            .filter_map(|r| weth_position(&r.token0, &r.token1, &self.weth).map(|w| (r, w)))
            .collect();

        for group in priced.chunks(self.parallelism) {
            let fetches = group.iter().map(|(record, is_token0_weth)| {
                let chain = self.chain.clone();
                async move {
                    let pool: Address = record.pool.parse().ok()?;
                    let logs = chain
                        .get_logs(pool, kumbaya::Swap::SIGNATURE_HASH, from, head)
                        .await;
                    Some((record, *is_token0_weth, logs))
                }
            });

            for fetched in join_all(fetches).await.into_iter().flatten() {
                let (record, is_token0_weth, logs) = fetched;
                let logs = match logs {
                    Ok(logs) => logs,
                    Err(e) => {
                        pools_failed += 1;
                        if pools_failed <= MAX_LOGGED_ERRORS_PER_PASS {
                            warn!("  Backfill failed for pool {}: {e:#}", record.pool);
                        }
                        continue;
                    },
                };

                let decimals0 = store.token_decimals(&record.token0);
                let decimals1 = store.token_decimals(&record.token1);

                for log in &logs {
                    let Ok(decoded) = kumbaya::Swap::decode_log(&log.inner) else {
                        continue;
                    };
                    let Some(trade) = trade_from_swap(
                        &record.pool,
                        log,
                        &decoded.data,
                        is_token0_weth,
                        decimals0,
                        decimals1,
                        eth_usd,
                        head,
                        now_secs,
                    ) else {
                        continue;
                    };
                    if store.add_trade(trade) {
                        trades_added += 1;
                    }
                }
            }
        }

        if pools_failed > MAX_LOGGED_ERRORS_PER_PASS {
            warn!("  {pools_failed} pools failed to backfill in total");
        }

        // Seed derived metrics before the store is marked ready
        store.compute_rolling_stats();
        store.compute_price_changes();

        info!("  Backfilled {trades_added} trades ({pools_failed} pools failed)");
        Ok(())
    }
}
