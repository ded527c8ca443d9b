//! Live swap polling.
//!
//! Every tick advances a block cursor from the last indexed block to the
//! current head: new pool creations are hydrated, and Swap events are
//! pulled for the active set (pools above the liquidity floor, capped by
//! count). The cursor advances to the head even when individual pool
//! queries fail; missed swaps in a failed range are accepted as gaps.

use std::sync::Arc;
use std::time::Duration;

use alloy::{primitives::Address, sol_types::SolEvent};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};

use crate::abis::kumbaya;
use crate::chain::ChainClient;
use crate::config::IndexerSettings;
use crate::data::EthPriceFetcher;
use crate::indexer::discovery::fetch_pool_created;
use crate::indexer::hydration::PoolHydrator;
use crate::indexer::swaps::{trade_from_swap, weth_position};
use crate::indexer::MAX_LOGGED_ERRORS_PER_PASS;
use crate::store::{DataStore, Pool};

pub struct LivePoller {
    chain: Arc<ChainClient>,
    eth_price: Arc<EthPriceFetcher>,
    hydrator: PoolHydrator,
    factory: Address,
    weth: String,
    max_active_pools: usize,
    min_active_liquidity_usd: f64,
    parallelism: usize,
    poll_interval: Duration,
}

impl LivePoller {
    pub fn new(
        chain: Arc<ChainClient>,
        eth_price: Arc<EthPriceFetcher>,
        factory: Address,
        settings: &IndexerSettings,
    ) -> Self {
        Self {
            hydrator: PoolHydrator::new(chain.clone(), settings),
            chain,
            eth_price,
            factory,
            weth: settings.weth_address.to_lowercase(),
            max_active_pools: settings.max_active_pools,
            min_active_liquidity_usd: settings.min_active_liquidity_usd,
            parallelism: settings.backfill_parallelism.max(1),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
        }
    }

    /// Poll forever at the configured interval. Never returns.
    pub async fn run(&self, store: &DataStore) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "Live poller started (every {}s, top {} pools)",
            self.poll_interval.as_secs(),
            self.max_active_pools
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(store).await {
                warn!("Poll tick failed: {e:#}");
            }
        }
    }

    async fn tick(&self, store: &DataStore) -> anyhow::Result<()> {
        let head = self.chain.block_number().await?;
        let last = store.stats().last_indexed_block;
        if head <= last {
            return Ok(());
        }
        let from = last + 1;

        // New pool creations since the last tick
        match fetch_pool_created(&self.chain, self.factory, from, head).await {
            Ok(records) if !records.is_empty() => {
                info!("Found {} new pools", records.len());
                if let Err(e) = self.hydrator.hydrate(store, &self.eth_price, &records).await {
                    warn!("Hydration of new pools failed: {e:#}");
                }
            },
            Ok(_) => {},
            Err(e) => warn!("New pool scan failed for range {from}-{head}: {e:#}"),
        }

        let active = self.active_pools(store);
        debug!("Polling {} active pools over blocks {from}-{head}", active.len());

        let now_secs = Utc::now().timestamp();
        let eth_usd = store.eth_price_usd();
        let mut trades_added = 0usize;
        let mut pools_failed = 0usize;

        for group in active.chunks(self.parallelism) {
            let fetches = group.iter().map(|pool| {
                let chain = self.chain.clone();
                async move {
                    let address: Address = pool.address.parse().ok()?;
                    let logs = chain
                        .get_logs(address, kumbaya::Swap::SIGNATURE_HASH, from, head)
                        .await;
                    Some((pool, logs))
                }
            });

            for fetched in join_all(fetches).await.into_iter().flatten() {
                let (pool, logs) = fetched;
                let logs = match logs {
                    Ok(logs) => logs,
                    Err(e) => {
                        pools_failed += 1;
                        if pools_failed <= MAX_LOGGED_ERRORS_PER_PASS {
                            warn!("Swap poll failed for pool {}: {e:#}", pool.address);
                        }
                        continue;
                    },
                };

                trades_added +=
                    self.apply_swaps(store, pool, &logs, eth_usd, head, now_secs);
            }
        }

        if pools_failed > MAX_LOGGED_ERRORS_PER_PASS {
            warn!("{pools_failed} pools failed to poll this tick");
        }
        if trades_added > 0 {
            info!("Indexed {trades_added} new trades (head block {head})");
        }

        // The cursor moves even past gaps so a single bad pool cannot
        // stall the pipeline.
        store.set_last_indexed_block(head);
        Ok(())
    }

    /// Pools above the liquidity floor, highest liquidity first, capped.
    fn active_pools(&self, store: &DataStore) -> Vec<Pool> {
        let mut pools: Vec<Pool> = store
            .all_pools()
            .into_iter()
            .filter(|p| p.liquidity_usd > self.min_active_liquidity_usd)
            .collect();
        pools.sort_by(|a, b| {
            b.liquidity_usd
                .partial_cmp(&a.liquidity_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pools.truncate(self.max_active_pools);
        pools
    }

    /// Convert a pool's new swap logs into trades and fold the most
    /// recent event's price state into the pool record. Pools without a
    /// WETH leg are skipped entirely; they cannot be priced in USD.
    fn apply_swaps(
        &self,
        store: &DataStore,
        pool: &Pool,
        logs: &[alloy::rpc::types::Log],
        eth_usd: f64,
        head: u64,
        now_secs: i64,
    ) -> usize {
        let Some(is_token0_weth) = weth_position(&pool.token0, &pool.token1, &self.weth) else {
            return 0;
        };
        let decimals0 = store.token_decimals(&pool.token0);
        let decimals1 = store.token_decimals(&pool.token1);

        let mut added = 0usize;
        let mut latest: Option<kumbaya::Swap> = None;

        for log in logs {
            let Ok(decoded) = kumbaya::Swap::decode_log(&log.inner) else {
                continue;
            };
            let event = decoded.data;

            if let Some(trade) = trade_from_swap(
                &pool.address,
                log,
                &event,
                is_token0_weth,
                decimals0,
                decimals1,
                eth_usd,
                head,
                now_secs,
            ) {
                if store.add_trade(trade) {
                    added += 1;
                }
            }
            latest = Some(event);
        }

        if let Some(event) = latest {
            let sqrt_price_x96 = event.sqrtPriceX96.to::<alloy::primitives::U256>();
            let price_usd = crate::utils::validate_usd_price(crate::utils::token_price_usd(
                sqrt_price_x96,
                decimals0,
                decimals1,
                is_token0_weth,
                eth_usd,
            ));

            store.update_pool(&pool.address, |p| {
                p.sqrt_price_x96 = sqrt_price_x96;
                p.tick = event.tick.as_i32();
                p.liquidity = event.liquidity;
                p.price_usd = price_usd;
                p.price_eth = if eth_usd > 0.0 { price_usd / eth_usd } else { 0.0 };
                p.updated_at = Utc::now();
            });
        }

        added
    }
}
