use alloy::primitives::U256;
use chrono::{DateTime, Utc};

/// Trade direction relative to the non-WETH token of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    Buy,
    Sell,
}

impl SwapSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapSide::Buy => "buy",
            SwapSide::Sell => "sell",
        }
    }
}

/// Candle timeframes maintained for every pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Bucket duration in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

/// A tracked liquidity pool: identity, raw on-chain state, and metrics
/// derived from that state plus trade history.
///
/// Derived metrics are recomputed from raw state and history; they are
/// never mutated independently of them.
#[derive(Debug, Clone)]
pub struct Pool {
    // Identity
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub fee: u32,
    pub dex: String,
    pub created_at: DateTime<Utc>,

    // Raw state from slot0/liquidity
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,

    // Derived metrics
    pub price_usd: f64,
    pub price_eth: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub volume_1h: f64,
    pub txns_24h: u64,
    pub txns_1h: u64,
    pub price_change_5m: f64,
    pub price_change_1h: f64,
    pub price_change_6h: f64,
    pub price_change_24h: f64,
    pub updated_at: DateTime<Utc>,
}

/// ERC-20 token metadata. Immutable once hydrated except for refreshes;
/// verification flags are populated externally and default to false.
#[derive(Debug, Clone)]
pub struct Token {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub is_verified: bool,
    pub has_mint_function: bool,
}

/// One fully classified swap.
///
/// `id` is `{tx_hash}-{log_index}`, unique per on-chain event, so
/// re-inserting the same swap is idempotent.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: String,
    pub pool_address: String,
    pub tx_hash: String,
    pub block_number: u64,
    /// Unix seconds (estimated for backfilled trades)
    pub timestamp: i64,
    pub side: SwapSide,
    pub price: f64,
    pub amount_token: f64,
    pub amount_eth: f64,
    pub value_usd: f64,
    pub maker: String,
}

/// One OHLCV bucket. Only the most recent candle per (pool, timeframe)
/// is still mutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Bucket start, unix seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Cumulative USD volume
    pub volume: f64,
    pub txns: u32,
}

/// A (timestamp, price) sample kept for a bounded trailing window,
/// used only for percent-change computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    /// Unix seconds
    pub timestamp: i64,
    pub price: f64,
}

/// Process-wide aggregate counters.
#[derive(Debug, Clone, Default)]
pub struct IndexerStats {
    pub total_pools: usize,
    pub total_volume_24h: f64,
    pub total_txns_24h: u64,
    pub last_indexed_block: u64,
    pub ready: bool,
    /// Unix seconds the indexer started at
    pub started_at: i64,
    pub eth_price_usd: f64,
}
