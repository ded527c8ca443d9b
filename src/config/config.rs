use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Indexer configuration for the tracked chain and DEX.
///
/// Only the RPC endpoint is strictly required; every contract address and
/// tuning constant defaults to the MegaETH / Kumbaya deployment values.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    /// JSON-RPC HTTP endpoint for the chain
    pub rpc_url: String,
    /// Kumbaya V3 factory contract
    #[serde(default = "default_factory_address")]
    pub factory_address: String,
    /// Block the factory was deployed at (discovery scan start)
    #[serde(default = "default_factory_deploy_block")]
    pub factory_deploy_block: u64,
    /// Wrapped native token (numeraire used for USD pricing)
    #[serde(default = "default_weth_address")]
    pub weth_address: String,
    /// Multicall3 contract for batched read calls
    #[serde(default = "default_multicall3_address")]
    pub multicall3_address: String,
    /// Blocks per eth_getLogs chunk during discovery
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Calls per aggregate3 sub-batch (RPC payload limit)
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
    /// Trailing block window replayed during backfill
    #[serde(default = "default_backfill_blocks")]
    pub backfill_blocks: u64,
    /// Pools queried concurrently during backfill
    #[serde(default = "default_backfill_parallelism")]
    pub backfill_parallelism: usize,
    /// Maximum pools actively polled for swaps per tick
    #[serde(default = "default_max_active_pools")]
    pub max_active_pools: usize,
    /// Minimum USD liquidity for a pool to be actively polled
    #[serde(default = "default_min_active_liquidity_usd")]
    pub min_active_liquidity_usd: f64,
    /// Live swap poll interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Full pool state refresh interval
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_factory_address() -> String {
    "0x68b34591f662508076927803c567cc8006988a09".to_string()
}

fn default_factory_deploy_block() -> u64 {
    3_520_000
}

fn default_weth_address() -> String {
    "0x4200000000000000000000000000000000000006".to_string()
}

fn default_multicall3_address() -> String {
    "0xca11bde05977b3631167028862be2a173976ca11".to_string()
}

fn default_chunk_size() -> u64 {
    50_000
}

fn default_multicall_batch_size() -> usize {
    80
}

fn default_backfill_blocks() -> u64 {
    5_000
}

fn default_backfill_parallelism() -> usize {
    10
}

fn default_max_active_pools() -> usize {
    50
}

fn default_min_active_liquidity_usd() -> f64 {
    100.0
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_refresh_interval_secs() -> u64 {
    30
}

/// PostgreSQL sync target configuration.
///
/// The database is a write-behind replica of the in-memory store so other
/// processes can read indexed data. The section is optional: when absent,
/// the sync driver is not started and the indexer runs memory-only.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Delta sync interval
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

fn default_pool_size() -> usize {
    16
}

fn default_sync_interval_secs() -> u64 {
    15
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup. A missing or invalid RPC endpoint
/// is fatal; everything else has a default.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
