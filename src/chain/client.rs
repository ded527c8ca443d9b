//! JSON-RPC chain reader.
//!
//! Thin abstraction over the chain endpoint: current block height, log
//! queries over an address + topic filter, and a batched multicall
//! executor. No retry policy lives here; callers own chunking and retry.

use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
    sol_types::SolCall,
};
use anyhow::{Context, Result};
use url::Url;

use crate::abis::multicall::{Call3, IMulticall3};

/// Timeout for individual RPC calls (30 seconds)
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// One read-only contract call for the batched executor.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub target: Address,
    pub calldata: Bytes,
}

impl CallRequest {
    pub fn new<C: SolCall>(target: Address, call: C) -> Self {
        Self {
            target,
            calldata: call.abi_encode().into(),
        }
    }
}

/// HTTP JSON-RPC client for the tracked chain.
pub struct ChainClient {
    provider: DynProvider,
    multicall3: Address,
}

impl ChainClient {
    pub fn new(rpc_url: &str, multicall3: Address) -> Result<Self> {
        let url = Url::parse(rpc_url).context("Invalid RPC URL")?;

        let client = ProviderBuilder::new().connect_http(url);
        let provider = DynProvider::new(client);

        Ok(Self {
            provider,
            multicall3,
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        let block = tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_block_number())
            .await
            .context("eth_blockNumber timeout")?
            .context("eth_blockNumber failed")?;
        Ok(block)
    }

    /// Event logs for one contract and topic0 over an inclusive block range.
    pub async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topic0)
            .from_block(from_block)
            .to_block(to_block);

        let logs = tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_logs(&filter))
            .await
            .context("eth_getLogs timeout")?
            .with_context(|| format!("eth_getLogs failed for range {from_block}-{to_block}"))?;

        Ok(logs)
    }

    /// Execute many read calls in one aggregate3 round trip.
    ///
    /// Per-entry failure is isolated: a reverted call yields `None` in its
    /// slot without failing siblings. A transport error fails the whole
    /// batch; the caller decides whether to sub-divide or skip.
    pub async fn multicall(&self, requests: &[CallRequest]) -> Result<Vec<Option<Bytes>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let multicall = IMulticall3::new(self.multicall3, self.provider.clone());

        let calls: Vec<Call3> = requests
            .iter()
            .map(|req| Call3 {
                target: req.target,
                allowFailure: true,
                callData: req.calldata.clone(),
            })
            .collect();

        let results = tokio::time::timeout(RPC_CALL_TIMEOUT, multicall.aggregate3(calls).call())
            .await
            .context("Multicall timeout")?
            .context("Multicall aggregate3 failed")?;

        Ok(results
            .into_iter()
            .map(|res| if res.success { Some(res.returnData) } else { None })
            .collect())
    }
}
