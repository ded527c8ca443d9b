//! Periodic full-state refresh.
//!
//! Re-reads slot0 and liquidity for every tracked pool through batched
//! multicalls, refreshes the ETH/USD anchor, and recomputes all derived
//! metrics. A pool whose calls fail keeps its previous state until the
//! next pass.

use std::sync::Arc;
use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use chrono::Utc;
use log::{debug, info, warn};

use crate::abis::kumbaya::IKumbayaPool;
use crate::chain::{CallRequest, ChainClient};
use crate::config::IndexerSettings;
use crate::data::EthPriceFetcher;
use crate::indexer::MAX_LOGGED_ERRORS_PER_PASS;
use crate::store::{DataStore, Pool};
use crate::utils::{pool_liquidity_usd, token_price_usd, validate_usd_price};

/// Calls issued per pool (slot0 + liquidity).
const CALLS_PER_POOL: usize = 2;

pub struct PoolRefresher {
    chain: Arc<ChainClient>,
    eth_price: Arc<EthPriceFetcher>,
    weth: String,
    batch_size: usize,
    refresh_interval: Duration,
}

impl PoolRefresher {
    pub fn new(
        chain: Arc<ChainClient>,
        eth_price: Arc<EthPriceFetcher>,
        settings: &IndexerSettings,
    ) -> Self {
        Self {
            chain,
            eth_price,
            weth: settings.weth_address.to_lowercase(),
            batch_size: settings.multicall_batch_size,
            refresh_interval: Duration::from_secs(settings.refresh_interval_secs),
        }
    }

    /// Refresh forever at the configured interval. Never returns.
    pub async fn run(&self, store: &DataStore) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Pool refresher started (every {}s)", self.refresh_interval.as_secs());

        loop {
            ticker.tick().await;
            self.tick(store).await;
        }
    }

    async fn tick(&self, store: &DataStore) {
        let eth_usd = self.eth_price.usd_price().await;
        store.set_eth_price_usd(eth_usd);

        let pools = store.all_pools();
        if pools.is_empty() {
            return;
        }
        debug!("Refreshing state for {} pools", pools.len());

        let pools_per_batch = (self.batch_size / CALLS_PER_POOL).max(1);
        let mut batch_errors = 0usize;

        for chunk in pools.chunks(pools_per_batch) {
            let mut requests = Vec::with_capacity(chunk.len() * CALLS_PER_POOL);
            let mut valid = Vec::with_capacity(chunk.len());

            for pool in chunk {
                let Ok(target) = pool.address.parse::<Address>() else {
                    continue;
                };
                valid.push(pool);
                requests.push(CallRequest::new(target, IKumbayaPool::slot0Call {}));
                requests.push(CallRequest::new(target, IKumbayaPool::liquidityCall {}));
            }

            let results = match self.chain.multicall(&requests).await {
                Ok(results) => results,
                Err(e) => {
                    batch_errors += 1;
                    if batch_errors <= MAX_LOGGED_ERRORS_PER_PASS {
                        warn!("Pool refresh batch failed: {e:#}");
                    }
                    continue;
                },
            };

            for (i, pool) in valid.iter().copied().enumerate() {
                let slot = &results[i * CALLS_PER_POOL..(i + 1) * CALLS_PER_POOL];
                self.apply_state(store, pool, slot, eth_usd);
            }
        }

        if batch_errors > MAX_LOGGED_ERRORS_PER_PASS {
            warn!("{batch_errors} refresh batches failed in total");
        }

        store.compute_rolling_stats();
        store.compute_price_changes();
    }

    /// Fold fresh slot0/liquidity results into a pool record. Reverted
    /// calls leave the corresponding fields untouched.
    fn apply_state(&self, store: &DataStore, pool: &Pool, results: &[Option<Bytes>], eth_usd: f64) {
        let slot0 = results[0]
            .as_ref()
            .and_then(|data| IKumbayaPool::slot0Call::abi_decode_returns(data).ok());
        let liquidity = results[1]
            .as_ref()
            .and_then(|data| IKumbayaPool::liquidityCall::abi_decode_returns(data).ok());

        if slot0.is_none() && liquidity.is_none() {
            return;
        }

        let is_token0_weth = pool.token0 == self.weth;
        let is_weth_paired = is_token0_weth || pool.token1 == self.weth;

        let sqrt_price_x96 = slot0
            .as_ref()
            .map(|s| s.sqrtPriceX96.to::<U256>())
            .unwrap_or(pool.sqrt_price_x96);
        let new_liquidity = liquidity.unwrap_or(pool.liquidity);

        let mut price_usd = pool.price_usd;
        let mut liquidity_usd = pool.liquidity_usd;
        if is_weth_paired {
            let decimals0 = store.token_decimals(&pool.token0);
            let decimals1 = store.token_decimals(&pool.token1);

            let l = pool_liquidity_usd(new_liquidity, sqrt_price_x96, is_token0_weth, eth_usd);
            price_usd = validate_usd_price(token_price_usd(
                sqrt_price_x96,
                decimals0,
                decimals1,
                is_token0_weth,
                eth_usd,
            ));
            liquidity_usd = if l.is_finite() { l } else { 0.0 };
        }

        store.update_pool(&pool.address, |p| {
            if let Some(s) = &slot0 {
                p.sqrt_price_x96 = s.sqrtPriceX96.to::<U256>();
                p.tick = s.tick.as_i32();
            }
            p.liquidity = new_liquidity;
            if is_weth_paired {
                p.price_usd = price_usd;
                p.price_eth = if eth_usd > 0.0 { price_usd / eth_usd } else { 0.0 };
                p.liquidity_usd = liquidity_usd;
            }
            p.updated_at = Utc::now();
        });
    }
}
