//! In-memory store for indexed on-chain data.
//!
//! The store is the single source of truth during a run: every component
//! reads and writes through it and nothing caches derived values outside
//! it. Data resets on restart; the indexer re-seeds it in seconds.
//!
//! All addresses are lower-cased at every entry point so map keys and
//! equality always use the canonical form. Locking lives entirely behind
//! this interface; overlapping writers resolve as last-write-wins.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::models::{Candle, IndexerStats, Pool, PricePoint, Timeframe, Token, Trade};

/// Trades retained per pool (oldest evicted first).
const MAX_TRADES_PER_POOL: usize = 500;

/// Candles retained per (pool, timeframe).
const MAX_CANDLES_PER_TIMEFRAME: usize = 500;

/// Price history retention window: 25 hours, one hour past the longest
/// price-change look-back.
const MAX_PRICE_HISTORY_SECS: i64 = 25 * 60 * 60;

/// Price-change look-back windows, paired with the pool field they feed.
const PRICE_CHANGE_WINDOWS: [(i64, PriceChangeField); 4] = [
    (5 * 60, PriceChangeField::M5),
    (60 * 60, PriceChangeField::H1),
    (6 * 60 * 60, PriceChangeField::H6),
    (24 * 60 * 60, PriceChangeField::H24),
];

#[derive(Clone, Copy)]
enum PriceChangeField {
    M5,
    H1,
    H6,
    H24,
}

struct StoreInner {
    pools: HashMap<String, Pool>,
    tokens: HashMap<String, Token>,
    /// Pool address -> trades, newest first
    trades: HashMap<String, VecDeque<Trade>>,
    candles: HashMap<String, HashMap<Timeframe, Vec<Candle>>>,
    /// Pool address -> price points, oldest first
    price_history: HashMap<String, VecDeque<PricePoint>>,
    stats: IndexerStats,
}

/// Process-lifetime canonical state: pools, tokens, trades, candles,
/// price history, and aggregate stats. Owns all mutation and all
/// derived-metric computation.
pub struct DataStore {
    inner: RwLock<StoreInner>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                pools: HashMap::new(),
                tokens: HashMap::new(),
                trades: HashMap::new(),
                candles: HashMap::new(),
                price_history: HashMap::new(),
                stats: IndexerStats {
                    eth_price_usd: 3000.0,
                    ..IndexerStats::default()
                },
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== POOLS ====================

    pub fn add_pool(&self, pool: Pool) {
        let mut inner = self.write();
        inner.pools.insert(pool.address.to_lowercase(), pool);
        inner.stats.total_pools = inner.pools.len();
    }

    pub fn get_pool(&self, address: &str) -> Option<Pool> {
        self.read().pools.get(&address.to_lowercase()).cloned()
    }

    pub fn all_pools(&self) -> Vec<Pool> {
        self.read().pools.values().cloned().collect()
    }

    /// Apply a mutation to one pool in place. Returns false when the pool
    /// is unknown.
    pub fn update_pool<F: FnOnce(&mut Pool)>(&self, address: &str, f: F) -> bool {
        let mut inner = self.write();
        match inner.pools.get_mut(&address.to_lowercase()) {
            Some(pool) => {
                f(pool);
                true
            },
            None => false,
        }
    }

    // ==================== TOKENS ====================

    pub fn add_token(&self, token: Token) {
        let mut inner = self.write();
        inner.tokens.insert(token.address.to_lowercase(), token);
    }

    pub fn get_token(&self, address: &str) -> Option<Token> {
        self.read().tokens.get(&address.to_lowercase()).cloned()
    }

    pub fn all_tokens(&self) -> Vec<Token> {
        self.read().tokens.values().cloned().collect()
    }

    /// Decimals for a token, defaulting to 18 when unknown.
    pub fn token_decimals(&self, address: &str) -> u8 {
        self.read()
            .tokens
            .get(&address.to_lowercase())
            .map(|t| t.decimals)
            .unwrap_or(18)
    }

    // ==================== TRADES ====================

    /// Insert a trade, updating the pool's candles and price history as a
    /// side effect. Re-inserting an id already in the retained window is a
    /// no-op; returns false in that case.
    pub fn add_trade(&self, trade: Trade) -> bool {
        let mut inner = self.write();
        let key = trade.pool_address.to_lowercase();

        let ring = inner.trades.entry(key.clone()).or_default();
        if ring.iter().any(|t| t.id == trade.id) {
            return false;
        }
        ring.push_front(trade.clone());
        ring.truncate(MAX_TRADES_PER_POOL);

        inner.update_candles(&key, &trade);
        inner.add_price_point(
            &key,
            PricePoint {
                timestamp: trade.timestamp,
                price: trade.price,
            },
        );
        true
    }

    /// Most recent trades for a pool, newest first.
    pub fn trades_for_pool(&self, address: &str, limit: usize) -> Vec<Trade> {
        self.read()
            .trades
            .get(&address.to_lowercase())
            .map(|ring| ring.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// All retained trades across all pools (used by the sync layer).
    pub fn all_trades(&self) -> Vec<Trade> {
        self.read()
            .trades
            .values()
            .flat_map(|ring| ring.iter().cloned())
            .collect()
    }

    /// Trade ids currently resident in the store.
    pub fn resident_trade_ids(&self) -> std::collections::HashSet<String> {
        self.read()
            .trades
            .values()
            .flat_map(|ring| ring.iter().map(|t| t.id.clone()))
            .collect()
    }

    // ==================== CANDLES ====================

    /// Most recent candles for a pool and timeframe, oldest first.
    pub fn candles_for_pool(&self, address: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let inner = self.read();
        let Some(series) = inner
            .candles
            .get(&address.to_lowercase())
            .and_then(|tf| tf.get(&timeframe))
        else {
            return Vec::new();
        };
        let skip = series.len().saturating_sub(limit);
        series[skip..].to_vec()
    }

    /// The trailing `per_series` candles of every (pool, timeframe) series.
    /// The sync layer pushes these as "possibly still mutating".
    pub fn recent_candles(&self, per_series: usize) -> Vec<(String, Timeframe, Candle)> {
        let inner = self.read();
        let mut out = Vec::new();
        for (pool, by_tf) in &inner.candles {
            for (tf, series) in by_tf {
                let skip = series.len().saturating_sub(per_series);
                for candle in &series[skip..] {
                    out.push((pool.clone(), *tf, candle.clone()));
                }
            }
        }
        out
    }

    /// Every retained candle of every (pool, timeframe) series.
    pub fn all_candles(&self) -> Vec<(String, Timeframe, Candle)> {
        self.recent_candles(usize::MAX)
    }

    // ==================== PRICE HISTORY ====================

    /// Snapshot of each pool's retained price points, oldest first.
    pub fn price_history(&self) -> HashMap<String, Vec<PricePoint>> {
        self.read()
            .price_history
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
            .collect()
    }

    // ==================== STATS ====================

    pub fn stats(&self) -> IndexerStats {
        self.read().stats.clone()
    }

    pub fn set_last_indexed_block(&self, block: u64) {
        self.write().stats.last_indexed_block = block;
    }

    pub fn mark_ready(&self) {
        self.write().stats.ready = true;
    }

    pub fn set_started_at(&self, unix_secs: i64) {
        self.write().stats.started_at = unix_secs;
    }

    pub fn eth_price_usd(&self) -> f64 {
        self.read().stats.eth_price_usd
    }

    pub fn set_eth_price_usd(&self, price: f64) {
        self.write().stats.eth_price_usd = price;
    }

    // ==================== RECOMPUTE PASSES ====================

    /// Recompute every pool's rolling 1h/24h volume and transaction
    /// counts from the retained trades, and the process-wide totals.
    pub fn compute_rolling_stats(&self) {
        self.compute_rolling_stats_at(Utc::now().timestamp());
    }

    pub fn compute_rolling_stats_at(&self, now_secs: i64) {
        let mut inner = self.write();
        let h1 = now_secs - 3_600;
        let h24 = now_secs - 86_400;
        let mut total_vol_24h = 0.0;
        let mut total_txns_24h: u64 = 0;

        let addresses: Vec<String> = inner.pools.keys().cloned().collect();
        for addr in addresses {
            let (mut vol_24h, mut vol_1h) = (0.0, 0.0);
            let (mut txns_24h, mut txns_1h) = (0u64, 0u64);

            if let Some(ring) = inner.trades.get(&addr) {
                for t in ring {
                    if t.timestamp >= h24 {
                        vol_24h += t.value_usd;
                        txns_24h += 1;
                    }
                    if t.timestamp >= h1 {
                        vol_1h += t.value_usd;
                        txns_1h += 1;
                    }
                }
            }

            if let Some(pool) = inner.pools.get_mut(&addr) {
                pool.volume_24h = vol_24h;
                pool.volume_1h = vol_1h;
                pool.txns_24h = txns_24h;
                pool.txns_1h = txns_1h;
            }

            total_vol_24h += vol_24h;
            total_txns_24h += txns_24h;
        }

        inner.stats.total_volume_24h = total_vol_24h;
        inner.stats.total_txns_24h = total_txns_24h;
    }

    /// Recompute percent price changes for every pool from price history.
    ///
    /// A window with no qualifying sample leaves the field at its prior
    /// value instead of resetting it, so sparse history does not make a
    /// pool's stats oscillate.
    pub fn compute_price_changes(&self) {
        self.compute_price_changes_at(Utc::now().timestamp());
    }

    pub fn compute_price_changes_at(&self, now_secs: i64) {
        let mut inner = self.write();
        let addresses: Vec<String> = inner.pools.keys().cloned().collect();

        for addr in addresses {
            let Some(history) = inner.price_history.get(&addr) else {
                continue;
            };
            let Some(current) = history.back().map(|p| p.price) else {
                continue;
            };
            if current == 0.0 {
                continue;
            }

            let mut changes: Vec<(PriceChangeField, f64)> = Vec::new();
            for (window, field) in PRICE_CHANGE_WINDOWS {
                let target = now_secs - window;
                // Latest sample at or before the target time
                let baseline = history
                    .iter()
                    .take_while(|p| p.timestamp <= target)
                    .last()
                    .map(|p| p.price);
                if let Some(base) = baseline {
                    if base > 0.0 {
                        changes.push((field, (current - base) / base * 100.0));
                    }
                }
            }

            if let Some(pool) = inner.pools.get_mut(&addr) {
                for (field, change) in changes {
                    match field {
                        PriceChangeField::M5 => pool.price_change_5m = change,
                        PriceChangeField::H1 => pool.price_change_1h = change,
                        PriceChangeField::H6 => pool.price_change_6h = change,
                        PriceChangeField::H24 => pool.price_change_24h = change,
                    }
                }
            }
        }
    }
}

impl StoreInner {
    /// Extend or open a candle for every timeframe.
    ///
    /// Bucket start = timestamp integer-divided by the timeframe duration.
    /// Matching bucket extends the open candle; otherwise a new candle is
    /// appended seeded at the trade price, evicting the oldest when over
    /// capacity.
    fn update_candles(&mut self, pool_key: &str, trade: &Trade) {
        let by_tf = self.candles.entry(pool_key.to_string()).or_default();

        for tf in Timeframe::ALL {
            let series = by_tf.entry(tf).or_default();
            let duration = tf.duration_secs();
            let bucket = trade.timestamp.div_euclid(duration) * duration;

            match series.last_mut() {
                Some(last) if last.time == bucket => {
                    last.high = last.high.max(trade.price);
                    last.low = last.low.min(trade.price);
                    last.close = trade.price;
                    last.volume += trade.value_usd;
                    last.txns += 1;
                },
                _ => {
                    series.push(Candle {
                        time: bucket,
                        open: trade.price,
                        high: trade.price,
                        low: trade.price,
                        close: trade.price,
                        volume: trade.value_usd,
                        txns: 1,
                    });
                    if series.len() > MAX_CANDLES_PER_TIMEFRAME {
                        series.remove(0);
                    }
                },
            }
        }
    }

    fn add_price_point(&mut self, pool_key: &str, point: PricePoint) {
        let series = self.price_history.entry(pool_key.to_string()).or_default();
        series.push_back(point);

        let cutoff = point.timestamp - MAX_PRICE_HISTORY_SECS;
        while series.front().is_some_and(|p| p.timestamp < cutoff) {
            series.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::SwapSide;
    use alloy::primitives::U256;

    fn test_pool(address: &str) -> Pool {
        Pool {
            address: address.to_string(),
            token0: "0x4200000000000000000000000000000000000006".to_string(),
            token1: "0x00000000000000000000000000000000000000aa".to_string(),
            fee: 3000,
            dex: "kumbaya".to_string(),
            created_at: Utc::now(),
            sqrt_price_x96: U256::ZERO,
            tick: 0,
            liquidity: 0,
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
        }
    }

    fn test_trade(id: &str, pool: &str, timestamp: i64, price: f64, value_usd: f64) -> Trade {
        Trade {
            id: id.to_string(),
            pool_address: pool.to_string(),
            tx_hash: format!("0xtx{id}"),
            block_number: 1,
            timestamp,
            side: SwapSide::Buy,
            price,
            amount_token: 1.0,
            amount_eth: 0.1,
            value_usd,
            maker: "0xmaker".to_string(),
        }
    }

    const POOL: &str = "0x00000000000000000000000000000000000000p1";

    #[test]
    fn test_candle_bucket_times_strictly_increase() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        // Trades across three 1m buckets, out-of-bucket prices varied
        for (i, ts) in [(0, 1_000_000i64), (1, 1_000_030), (2, 1_000_070), (3, 1_000_140)] {
            store.add_trade(test_trade(&format!("t{i}"), POOL, ts, 1.0 + i as f64, 10.0));
        }

        let candles = store.candles_for_pool(POOL, Timeframe::M1, 100);
        assert_eq!(candles.len(), 3);
        for pair in candles.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        for c in &candles {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
        }
    }

    #[test]
    fn test_candle_extends_within_bucket() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        // Bucket for 1m starts at 999_960 and ends before 1_000_020
        store.add_trade(test_trade("a", POOL, 1_000_000, 2.0, 100.0));
        store.add_trade(test_trade("b", POOL, 1_000_010, 5.0, 50.0));
        store.add_trade(test_trade("c", POOL, 1_000_019, 1.0, 25.0));

        let candles = store.candles_for_pool(POOL, Timeframe::M1, 10);
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open, 2.0);
        assert_eq!(c.high, 5.0);
        assert_eq!(c.low, 1.0);
        assert_eq!(c.close, 1.0);
        assert_eq!(c.volume, 175.0);
        assert_eq!(c.txns, 3);
    }

    #[test]
    fn test_trade_on_bucket_boundary_opens_new_candle() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        // 1_000_020 is an exact 1m boundary (16_667 * 60)
        store.add_trade(test_trade("a", POOL, 1_000_019, 2.0, 10.0));
        store.add_trade(test_trade("b", POOL, 1_000_020, 3.0, 10.0));

        let candles = store.candles_for_pool(POOL, Timeframe::M1, 10);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 999_960);
        assert_eq!(candles[1].time, 1_000_020);
        assert_eq!(candles[1].open, 3.0);
    }

    #[test]
    fn test_duplicate_trade_id_is_noop() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        assert!(store.add_trade(test_trade("dup", POOL, 1_000_000, 1.0, 10.0)));
        assert!(!store.add_trade(test_trade("dup", POOL, 1_000_000, 1.0, 10.0)));

        assert_eq!(store.trades_for_pool(POOL, 10).len(), 1);
        let candles = store.candles_for_pool(POOL, Timeframe::M1, 10);
        assert_eq!(candles[0].txns, 1);
    }

    #[test]
    fn test_rolling_1h_window_boundary() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        let now = 2_000_000i64;
        // -61 minutes: outside the 1h window
        store.add_trade(test_trade("old", POOL, now - 61 * 60, 1.0, 100.0));
        // -59 minutes: inside
        store.add_trade(test_trade("new", POOL, now - 59 * 60, 1.0, 50.0));

        store.compute_rolling_stats_at(now);

        let pool = store.get_pool(POOL).unwrap();
        assert_eq!(pool.volume_1h, 50.0);
        assert_eq!(pool.txns_1h, 1);
        // Both fall inside 24h
        assert_eq!(pool.volume_24h, 150.0);
        assert_eq!(pool.txns_24h, 2);

        let stats = store.stats();
        assert_eq!(stats.total_volume_24h, 150.0);
        assert_eq!(stats.total_txns_24h, 2);
    }

    #[test]
    fn test_price_change_last_known_good() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));
        // Prior computed value from an earlier run of the pass
        store.update_pool(POOL, |p| p.price_change_24h = 42.0);

        let now = 3_000_000i64;
        store.add_trade(test_trade("a", POOL, now - 10 * 60, 100.0, 10.0));
        store.add_trade(test_trade("b", POOL, now - 60, 110.0, 10.0));

        store.compute_price_changes_at(now);
        let pool = store.get_pool(POOL).unwrap();
        // 5m window has a qualifying baseline (the -10min sample)
        assert!((pool.price_change_5m - 10.0).abs() < 1e-9);
        // 24h window has no sample at or before now-24h: field keeps its
        // prior value instead of resetting to zero
        assert_eq!(pool.price_change_24h, 42.0);
    }

    #[test]
    fn test_price_change_skips_pools_without_history() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));
        store.update_pool(POOL, |p| p.price_change_1h = 7.0);

        store.compute_price_changes_at(3_000_000);
        assert_eq!(store.get_pool(POOL).unwrap().price_change_1h, 7.0);
    }

    #[test]
    fn test_bounded_collections_never_exceed_capacity() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        // One trade per minute, far more than any bound
        for i in 0..700i64 {
            store.add_trade(test_trade(&format!("t{i}"), POOL, 1_000_000 + i * 60, 1.0, 1.0));
        }

        assert_eq!(store.trades_for_pool(POOL, usize::MAX).len(), MAX_TRADES_PER_POOL);
        let candles = store.candles_for_pool(POOL, Timeframe::M1, usize::MAX);
        assert_eq!(candles.len(), MAX_CANDLES_PER_TIMEFRAME);

        // Price history bounded by the 25h retention window
        let history = store.price_history();
        let points = &history[POOL];
        let newest = points.last().unwrap().timestamp;
        assert!(points.iter().all(|p| p.timestamp >= newest - MAX_PRICE_HISTORY_SECS));
    }

    #[test]
    fn test_price_history_prunes_old_points() {
        let store = DataStore::new();
        store.add_pool(test_pool(POOL));

        store.add_trade(test_trade("old", POOL, 1_000_000, 1.0, 1.0));
        // 26 hours later: the first point falls out of the window
        store.add_trade(test_trade("new", POOL, 1_000_000 + 26 * 3600, 2.0, 1.0));

        let history = store.price_history();
        assert_eq!(history[POOL].len(), 1);
        assert_eq!(history[POOL][0].price, 2.0);
    }

    #[test]
    fn test_pool_addresses_canonicalized() {
        let store = DataStore::new();
        let mut pool = test_pool(POOL);
        pool.address = POOL.to_uppercase();
        store.add_pool(pool);

        assert!(store.get_pool(&POOL.to_uppercase()).is_some());
        assert!(store.get_pool(POOL).is_some());
        assert_eq!(store.stats().total_pools, 1);
    }

    #[test]
    fn test_update_pool_unknown_address() {
        let store = DataStore::new();
        assert!(!store.update_pool("0xmissing", |p| p.tick = 1));
    }
}
