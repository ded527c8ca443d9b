//! Phase 1: pool discovery.
//!
//! Scans every PoolCreated event from the factory's deployment block to
//! the current head in fixed-size chunks. A failed chunk is subdivided
//! and retried; a sub-range that still fails below the minimum span is
//! logged as a gap and skipped, favoring partial completeness over a
//! failed run.

use std::sync::Arc;

use alloy::{primitives::Address, sol_types::SolEvent};
use anyhow::Result;
use futures::future::BoxFuture;
use log::{info, warn};

use crate::abis::kumbaya::PoolCreated;
use crate::chain::ChainClient;
use crate::config::IndexerSettings;
use crate::store::DataStore;
use crate::utils::hex_encode;

/// Ranges are split by this factor when a log query fails.
const SUBDIVISION_FACTOR: u64 = 5;

/// A PoolCreated event, addresses canonicalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCreatedRecord {
    pub token0: String,
    pub token1: String,
    pub fee: u32,
    pub pool: String,
}

pub struct PoolDiscovery {
    chain: Arc<ChainClient>,
    factory: Address,
    deploy_block: u64,
    chunk_size: u64,
}

impl PoolDiscovery {
    pub fn new(chain: Arc<ChainClient>, factory: Address, settings: &IndexerSettings) -> Self {
        Self {
            chain,
            factory,
            deploy_block: settings.factory_deploy_block,
            chunk_size: settings.chunk_size,
        }
    }

    /// Scan all pool creations up to the current head. Records the head
    /// observed at scan time as the initial last-indexed block.
    pub async fn run(&self, store: &DataStore) -> Result<Vec<PoolCreatedRecord>> {
        info!("Phase 1: discovering pools from factory...");

        let head = self.chain.block_number().await?;
        let min_span = (self.chunk_size / (SUBDIVISION_FACTOR * SUBDIVISION_FACTOR)).max(1);

        let chain = self.chain.clone();
        let factory = self.factory;
        let query = move |from: u64, to: u64| -> BoxFuture<'static, Result<Vec<PoolCreatedRecord>>> {
            let chain = chain.clone();
            Box::pin(async move { fetch_pool_created(&chain, factory, from, to).await })
        };

        let mut records = Vec::new();
        let mut from = self.deploy_block;
        while from <= head {
            let to = (from + self.chunk_size - 1).min(head);
            let found = scan_range_subdivided(from, to, min_span, &query).await;
            records.extend(found);
            from = to + 1;
        }

        store.set_last_indexed_block(head);
        info!("  Found {} pools (head block {head})", records.len());
        Ok(records)
    }
}

/// Fetch and decode PoolCreated events for one block range.
pub(crate) async fn fetch_pool_created(
    chain: &ChainClient,
    factory: Address,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<PoolCreatedRecord>> {
    let logs = chain
        .get_logs(factory, PoolCreated::SIGNATURE_HASH, from_block, to_block)
        .await?;

    let records = logs
        .iter()
        .filter_map(|log| {
            let decoded = PoolCreated::decode_log(&log.inner).ok()?;
            let event = decoded.data;
            // Zero pool addresses are spoofed or malformed
            if event.pool.is_zero() {
                return None;
            }
            Some(PoolCreatedRecord {
                token0: hex_encode(event.token0.as_slice()),
                token1: hex_encode(event.token1.as_slice()),
                fee: event.fee.to::<u32>(),
                pool: hex_encode(event.pool.as_slice()),
            })
        })
        .collect();

    Ok(records)
}

/// Query a block range, subdividing on failure.
///
/// On error the range is split by [`SUBDIVISION_FACTOR`] and each
/// sub-range retried recursively. A failing range at or below `min_span`
/// is abandoned and logged as a gap. The result over a given range is
/// identical whether or not subdivision occurred, as long as the
/// underlying query is deterministic.
pub(crate) fn scan_range_subdivided<'a, T, F>(
    from: u64,
    to: u64,
    min_span: u64,
    query: &'a F,
) -> BoxFuture<'a, Vec<T>>
where
    T: Send + 'a,
    F: Fn(u64, u64) -> BoxFuture<'static, Result<Vec<T>>> + Sync,
{
    Box::pin(async move {
        match query(from, to).await {
            Ok(items) => items,
            Err(e) => {
                let span = to - from + 1;
                if span <= min_span {
                    warn!("  Range {from}-{to} failed below minimum span, skipping gap: {e:#}");
                    return Vec::new();
                }

                warn!("  Chunk {from}-{to} failed, retrying with smaller ranges");
                let sub_span = (span / SUBDIVISION_FACTOR).max(1);
                let mut items = Vec::new();
                let mut sub_from = from;
                while sub_from <= to {
                    let sub_to = (sub_from + sub_span - 1).min(to);
                    let found = scan_range_subdivided(sub_from, sub_to, min_span, query).await;
                    items.extend(found);
                    sub_from = sub_to + 1;
                }
                items
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    // Fixture: one item per block, query fails when the span is too wide.
    fn flaky_query(
        max_ok_span: u64,
        calls: StdArc<AtomicUsize>,
    ) -> impl Fn(u64, u64) -> BoxFuture<'static, Result<Vec<u64>>> + Sync {
        move |from, to| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if to - from + 1 > max_ok_span {
                    anyhow::bail!("span too wide");
                }
                Ok((from..=to).collect())
            })
        }
    }

    #[tokio::test]
    async fn test_subdivision_yields_same_results_as_direct_scan() {
        let calls = StdArc::new(AtomicUsize::new(0));

        // Direct: query succeeds for the whole range
        let direct_query = flaky_query(1_000, calls.clone());
        let direct = scan_range_subdivided(100, 349, 10, &direct_query).await;

        // Subdivided: the 250-block range fails until split down to <=50
        let narrow_query = flaky_query(50, calls.clone());
        let subdivided = scan_range_subdivided(100, 349, 10, &narrow_query).await;

        assert_eq!(direct, subdivided);
        assert_eq!(subdivided.len(), 250);
    }

    #[tokio::test]
    async fn test_failing_subrange_is_skipped_not_fatal() {
        // Query that always fails: every sub-range bottoms out and is
        // skipped, producing an empty (not errored) result.
        let query = |_from: u64, _to: u64| -> BoxFuture<'static, Result<Vec<u64>>> {
            Box::pin(async { anyhow::bail!("permanent failure") })
        };
        let items = scan_range_subdivided(0, 249, 10, &query).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_no_blocks_duplicated_or_lost_under_subdivision() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let query = flaky_query(7, calls);
        let mut items = scan_range_subdivided(0, 99, 1, &query).await;
        items.sort_unstable();
        let expected: Vec<u64> = (0..=99).collect();
        assert_eq!(items, expected);
    }
}
