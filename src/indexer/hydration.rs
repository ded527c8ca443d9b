//! Phase 2: pool and token hydration.
//!
//! Fetches ERC-20 metadata for every token and slot0/liquidity state for
//! every pool through batched multicalls, then seeds the store. A token
//! whose calls revert still gets an entry with placeholder metadata so
//! downstream pricing has decimals to work with.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};

use crate::abis::erc20::IERC20;
use crate::abis::kumbaya::IKumbayaPool;
use crate::chain::{CallRequest, ChainClient};
use crate::config::IndexerSettings;
use crate::data::EthPriceFetcher;
use crate::indexer::discovery::PoolCreatedRecord;
use crate::indexer::MAX_LOGGED_ERRORS_PER_PASS;
use crate::store::{DataStore, Pool, Token};
use crate::utils::{pool_liquidity_usd, token_price_usd, validate_usd_price};

/// Calls issued per token during metadata hydration.
const CALLS_PER_TOKEN: usize = 4;

/// Calls issued per pool during state hydration.
const CALLS_PER_POOL: usize = 2;

pub struct PoolHydrator {
    chain: Arc<ChainClient>,
    weth: String,
    batch_size: usize,
}

impl PoolHydrator {
    pub fn new(chain: Arc<ChainClient>, settings: &IndexerSettings) -> Self {
        Self {
            chain,
            weth: settings.weth_address.to_lowercase(),
            batch_size: settings.multicall_batch_size,
        }
    }

    /// Hydrate tokens and pools for the given creation records and seed
    /// the store. Individual call failures degrade to placeholder values;
    /// only a total inability to reach the chain is an error.
    pub async fn hydrate(
        &self,
        store: &DataStore,
        eth_price: &EthPriceFetcher,
        records: &[PoolCreatedRecord],
    ) -> Result<()> {
        info!("Phase 2: hydrating {} pools...", records.len());

        let eth_usd = eth_price.usd_price().await;
        store.set_eth_price_usd(eth_usd);

        self.hydrate_tokens(store, records).await?;
        self.hydrate_pools(store, records, eth_usd).await?;

        info!("  Hydrated {} tokens, {} pools", store.all_tokens().len(), store.all_pools().len());
        Ok(())
    }

    async fn hydrate_tokens(&self, store: &DataStore, records: &[PoolCreatedRecord]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for record in records {
            for addr in [&record.token0, &record.token1] {
                if seen.insert(addr.clone()) {
                    addresses.push(addr.clone());
                }
            }
        }

        let tokens_per_batch = (self.batch_size / CALLS_PER_TOKEN).max(1);
        let mut batch_errors = 0usize;

        for chunk in addresses.chunks(tokens_per_batch) {
            let mut requests = Vec::with_capacity(chunk.len() * CALLS_PER_TOKEN);
            let mut targets = Vec::with_capacity(chunk.len());

            for addr in chunk {
                let target: Address = addr
                    .parse()
                    .with_context(|| format!("Invalid token address {addr}"))?;
                targets.push((addr.clone(), target));
                requests.push(CallRequest::new(target, IERC20::nameCall {}));
                requests.push(CallRequest::new(target, IERC20::symbolCall {}));
                requests.push(CallRequest::new(target, IERC20::decimalsCall {}));
                requests.push(CallRequest::new(target, IERC20::totalSupplyCall {}));
            }

            // A failed sub-batch degrades every token in it to placeholders
            let results = match self.chain.multicall(&requests).await {
                Ok(results) => results,
                Err(e) => {
                    batch_errors += 1;
                    if batch_errors <= MAX_LOGGED_ERRORS_PER_PASS {
                        warn!("  Token metadata batch failed: {e:#}");
                    }
                    vec![None; requests.len()]
                },
            };

            for (i, (addr, _)) in targets.iter().enumerate() {
                let slot = &results[i * CALLS_PER_TOKEN..(i + 1) * CALLS_PER_TOKEN];
                store.add_token(decode_token(addr, slot));
            }
        }

        if batch_errors > MAX_LOGGED_ERRORS_PER_PASS {
            warn!("  {batch_errors} token metadata batches failed in total");
        }
        Ok(())
    }

    async fn hydrate_pools(
        &self,
        store: &DataStore,
        records: &[PoolCreatedRecord],
        eth_usd: f64,
    ) -> Result<()> {
        let pools_per_batch = (self.batch_size / CALLS_PER_POOL).max(1);
        let mut batch_errors = 0usize;

        for chunk in records.chunks(pools_per_batch) {
            let mut requests = Vec::with_capacity(chunk.len() * CALLS_PER_POOL);
            for record in chunk {
                let target: Address = record
                    .pool
                    .parse()
                    .with_context(|| format!("Invalid pool address {}", record.pool))?;
                requests.push(CallRequest::new(target, IKumbayaPool::slot0Call {}));
                requests.push(CallRequest::new(target, IKumbayaPool::liquidityCall {}));
            }

            let results = match self.chain.multicall(&requests).await {
                Ok(results) => results,
                Err(e) => {
                    batch_errors += 1;
                    if batch_errors <= MAX_LOGGED_ERRORS_PER_PASS {
                        warn!("  Pool state batch failed: {e:#}");
                    }
                    vec![None; requests.len()]
                },
            };

            for (i, record) in chunk.iter().enumerate() {
                let slot = &results[i * CALLS_PER_POOL..(i + 1) * CALLS_PER_POOL];
                let pool = self.build_pool(store, record, slot, eth_usd);
                store.add_pool(pool);
            }
        }

        if batch_errors > MAX_LOGGED_ERRORS_PER_PASS {
            warn!("  {batch_errors} pool state batches failed in total");
        }
        Ok(())
    }

    fn build_pool(
        &self,
        store: &DataStore,
        record: &PoolCreatedRecord,
        results: &[Option<Bytes>],
        eth_usd: f64,
    ) -> Pool {
        let (sqrt_price_x96, tick) = results[0]
            .as_ref()
            .and_then(|data| IKumbayaPool::slot0Call::abi_decode_returns(data).ok())
            .map(|slot0| (slot0.sqrtPriceX96.to::<U256>(), slot0.tick.as_i32()))
            .unwrap_or((U256::ZERO, 0));

        let liquidity = results[1]
            .as_ref()
            .and_then(|data| IKumbayaPool::liquidityCall::abi_decode_returns(data).ok())
            .unwrap_or(0);

        let mut pool = Pool {
            address: record.pool.clone(),
            token0: record.token0.clone(),
            token1: record.token1.clone(),
            fee: record.fee,
            dex: "kumbaya".to_string(),
            created_at: Utc::now(),
            sqrt_price_x96,
            tick,
            liquidity,
            price_usd: 0.0,
            price_eth: 0.0,
            liquidity_usd: 0.0,
            volume_24h: 0.0,
            volume_1h: 0.0,
            txns_24h: 0,
            txns_1h: 0,
            price_change_5m: 0.0,
            price_change_1h: 0.0,
            price_change_6h: 0.0,
            price_change_24h: 0.0,
            updated_at: Utc::now(),
        };

        // USD pricing only applies to WETH-paired pools
        let is_token0_weth = record.token0 == self.weth;
        let is_token1_weth = record.token1 == self.weth;
        if is_token0_weth || is_token1_weth {
            let decimals0 = store.token_decimals(&record.token0);
            let decimals1 = store.token_decimals(&record.token1);

            let price_usd =
                token_price_usd(sqrt_price_x96, decimals0, decimals1, is_token0_weth, eth_usd);
            let liquidity_usd =
                pool_liquidity_usd(liquidity, sqrt_price_x96, is_token0_weth, eth_usd);

            pool.price_usd = validate_usd_price(price_usd);
            pool.price_eth = if eth_usd > 0.0 { pool.price_usd / eth_usd } else { 0.0 };
            pool.liquidity_usd = if liquidity_usd.is_finite() { liquidity_usd } else { 0.0 };
        }

        pool
    }
}

/// Decode one token's metadata results, substituting placeholders for
/// reverted or missing calls.
fn decode_token(address: &str, results: &[Option<Bytes>]) -> Token {
    let name = results[0]
        .as_ref()
        .and_then(|data| IERC20::nameCall::abi_decode_returns(data).ok())
        .unwrap_or_else(|| "Unknown".to_string());

    let symbol = results[1]
        .as_ref()
        .and_then(|data| IERC20::symbolCall::abi_decode_returns(data).ok())
        .unwrap_or_else(|| "???".to_string());

    let decimals = results[2]
        .as_ref()
        .and_then(|data| IERC20::decimalsCall::abi_decode_returns(data).ok())
        .unwrap_or(18);

    let total_supply = results[3]
        .as_ref()
        .and_then(|data| IERC20::totalSupplyCall::abi_decode_returns(data).ok())
        .map(|supply| supply.to_string())
        .unwrap_or_else(|| "0".to_string());

    Token {
        address: address.to_lowercase(),
        name,
        symbol,
        decimals,
        total_supply,
        is_verified: false,
        has_mint_function: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    #[test]
    fn test_decode_token_with_all_calls_reverted() {
        let token = decode_token("0xAbC0000000000000000000000000000000000001", &[None, None, None, None]);
        assert_eq!(token.address, "0xabc0000000000000000000000000000000000001");
        assert_eq!(token.name, "Unknown");
        assert_eq!(token.symbol, "???");
        assert_eq!(token.decimals, 18);
        assert_eq!(token.total_supply, "0");
    }

    #[test]
    fn test_decode_token_partial_results() {
        let name: Bytes = ("MegaToken".to_string()).abi_encode().into();
        // uint8 returns occupy a full word; encoding via U256 matches
        let decimals: Bytes = U256::from(6u64).abi_encode().into();
        let supply: Bytes = U256::from(1_000_000u64).abi_encode().into();

        let token = decode_token(
            "0xabc0000000000000000000000000000000000002",
            &[Some(name), None, Some(decimals), Some(supply)],
        );
        assert_eq!(token.name, "MegaToken");
        assert_eq!(token.symbol, "???");
        assert_eq!(token.decimals, 6);
        assert_eq!(token.total_supply, "1000000");
    }
}
