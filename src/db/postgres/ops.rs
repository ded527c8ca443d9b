use log::error;

use crate::db::postgres::PostgresClient;
use crate::store::{Candle, IndexerStats, Pool, PricePoint, Timeframe, Token, Trade};

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Build multi-row VALUES placeholders: ($1,...,$n), ($n+1,...), ...
fn values_clauses(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|i| {
            let start = i * cols + 1;
            let placeholders: Vec<String> =
                (start..start + cols).map(|n| format!("${}", n)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl PostgresClient {
    // ==================== TOKENS ====================

    /// Batch upsert token metadata.
    pub async fn set_tokens(&self, tokens: &[Token]) -> anyhow::Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 7;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in tokens.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO tokens (
                    address, name, symbol, decimals, total_supply,
                    is_verified, has_mint_function
                ) VALUES {}
                ON CONFLICT (address) DO UPDATE SET
                    name = EXCLUDED.name,
                    symbol = EXCLUDED.symbol,
                    decimals = EXCLUDED.decimals,
                    total_supply = EXCLUDED.total_supply,
                    is_verified = EXCLUDED.is_verified,
                    has_mint_function = EXCLUDED.has_mint_function
                "#,
                values_clauses(chunk.len(), COLS_PER_ROW)
            );

            // Converted values must outlive the params slice
            let converted: Vec<(String, String, i32)> = chunk
                .iter()
                .map(|t| {
                    (
                        sanitize_string(&t.name),
                        sanitize_string(&t.symbol),
                        t.decimals as i32,
                    )
                })
                .collect();

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, token) in chunk.iter().enumerate() {
                params.push(&token.address);
                params.push(&converted[i].0);
                params.push(&converted[i].1);
                params.push(&converted[i].2);
                params.push(&token.total_supply);
                params.push(&token.is_verified);
                params.push(&token.has_mint_function);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch upsert {} tokens: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== POOLS ====================

    /// Batch upsert pool state and derived metrics.
    pub async fn set_pools(&self, pools: &[Pool]) -> anyhow::Result<()> {
        if pools.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 21;
        const BATCH_SIZE: usize = 300;

        let client = self.pool.get().await?;

        for chunk in pools.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO pools (
                    address, token0, token1, fee, dex, created_at,
                    sqrt_price_x96, tick, liquidity,
                    price_usd, price_eth, liquidity_usd,
                    volume_24h, volume_1h, txns_24h, txns_1h,
                    price_change_5m, price_change_1h, price_change_6h, price_change_24h,
                    updated_at
                ) VALUES {}
                ON CONFLICT (address) DO UPDATE SET
                    sqrt_price_x96 = EXCLUDED.sqrt_price_x96,
                    tick = EXCLUDED.tick,
                    liquidity = EXCLUDED.liquidity,
                    price_usd = EXCLUDED.price_usd,
                    price_eth = EXCLUDED.price_eth,
                    liquidity_usd = EXCLUDED.liquidity_usd,
                    volume_24h = EXCLUDED.volume_24h,
                    volume_1h = EXCLUDED.volume_1h,
                    txns_24h = EXCLUDED.txns_24h,
                    txns_1h = EXCLUDED.txns_1h,
                    price_change_5m = EXCLUDED.price_change_5m,
                    price_change_1h = EXCLUDED.price_change_1h,
                    price_change_6h = EXCLUDED.price_change_6h,
                    price_change_24h = EXCLUDED.price_change_24h,
                    updated_at = EXCLUDED.updated_at
                "#,
                values_clauses(chunk.len(), COLS_PER_ROW)
            );

            // uint256/uint128 values travel as text, counters as i64
            let converted: Vec<(i64, String, i32, String, i64, i64)> = chunk
                .iter()
                .map(|p| {
                    (
                        p.fee as i64,
                        p.sqrt_price_x96.to_string(),
                        p.tick,
                        p.liquidity.to_string(),
                        p.txns_24h as i64,
                        p.txns_1h as i64,
                    )
                })
                .collect();

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, pool) in chunk.iter().enumerate() {
                params.push(&pool.address);
                params.push(&pool.token0);
                params.push(&pool.token1);
                params.push(&converted[i].0);
                params.push(&pool.dex);
                params.push(&pool.created_at);
                params.push(&converted[i].1);
                params.push(&converted[i].2);
                params.push(&converted[i].3);
                params.push(&pool.price_usd);
                params.push(&pool.price_eth);
                params.push(&pool.liquidity_usd);
                params.push(&pool.volume_24h);
                params.push(&pool.volume_1h);
                params.push(&converted[i].4);
                params.push(&converted[i].5);
                params.push(&pool.price_change_5m);
                params.push(&pool.price_change_1h);
                params.push(&pool.price_change_6h);
                params.push(&pool.price_change_24h);
                params.push(&pool.updated_at);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch upsert {} pools: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== TRADES ====================

    /// Batch insert trades. Trades are immutable once written; conflicts
    /// on the natural id are ignored.
    pub async fn insert_trades(&self, trades: &[Trade]) -> anyhow::Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 11;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in trades.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO trades (
                    id, pool_address, tx_hash, block_number, timestamp,
                    side, price, amount_token, amount_eth, value_usd, maker
                ) VALUES {}
                ON CONFLICT (id) DO NOTHING
                "#,
                values_clauses(chunk.len(), COLS_PER_ROW)
            );

            let converted: Vec<(i64, &'static str)> = chunk
                .iter()
                .map(|t| (t.block_number as i64, t.side.as_str()))
                .collect();

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, trade) in chunk.iter().enumerate() {
                params.push(&trade.id);
                params.push(&trade.pool_address);
                params.push(&trade.tx_hash);
                params.push(&converted[i].0);
                params.push(&trade.timestamp);
                params.push(&converted[i].1);
                params.push(&trade.price);
                params.push(&trade.amount_token);
                params.push(&trade.amount_eth);
                params.push(&trade.value_usd);
                params.push(&trade.maker);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} trades: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== CANDLES ====================

    /// Batch upsert candles keyed by (pool, timeframe, bucket time). The
    /// newest bucket per series mutates until it closes, so upsert.
    pub async fn set_candles(&self, candles: &[(String, Timeframe, Candle)]) -> anyhow::Result<()> {
        if candles.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 9;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in candles.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO candles (
                    pool_address, timeframe, time,
                    open, high, low, close, volume, txns
                ) VALUES {}
                ON CONFLICT (pool_address, timeframe, time) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    txns = EXCLUDED.txns
                "#,
                values_clauses(chunk.len(), COLS_PER_ROW)
            );

            let converted: Vec<(&'static str, i32)> = chunk
                .iter()
                .map(|(_, tf, c)| (tf.label(), c.txns as i32))
                .collect();

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, (pool, _, candle)) in chunk.iter().enumerate() {
                params.push(pool);
                params.push(&converted[i].0);
                params.push(&candle.time);
                params.push(&candle.open);
                params.push(&candle.high);
                params.push(&candle.low);
                params.push(&candle.close);
                params.push(&candle.volume);
                params.push(&converted[i].1);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch upsert {} candles: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== PRICE HISTORY ====================

    /// Batch upsert price points keyed by (pool, timestamp).
    pub async fn set_price_points(&self, points: &[(String, PricePoint)]) -> anyhow::Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 3;
        const BATCH_SIZE: usize = 1_000;

        let client = self.pool.get().await?;

        for chunk in points.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO price_history (pool_address, timestamp, price)
                VALUES {}
                ON CONFLICT (pool_address, timestamp) DO UPDATE SET
                    price = EXCLUDED.price
                "#,
                values_clauses(chunk.len(), COLS_PER_ROW)
            );

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (pool, point) in chunk {
                params.push(pool);
                params.push(&point.timestamp);
                params.push(&point.price);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch upsert {} price points: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== STATS ====================

    /// Upsert the single process-wide stats row.
    pub async fn set_stats(&self, stats: &IndexerStats) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer_stats (
                id, total_pools, total_volume_24h, total_txns_24h,
                last_indexed_block, ready, started_at, eth_price_usd
            ) VALUES (1, $1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                total_pools = EXCLUDED.total_pools,
                total_volume_24h = EXCLUDED.total_volume_24h,
                total_txns_24h = EXCLUDED.total_txns_24h,
                last_indexed_block = EXCLUDED.last_indexed_block,
                ready = EXCLUDED.ready,
                started_at = EXCLUDED.started_at,
                eth_price_usd = EXCLUDED.eth_price_usd
        "#;

        let total_pools = stats.total_pools as i64;
        let total_txns_24h = stats.total_txns_24h as i64;
        let last_indexed_block = stats.last_indexed_block as i64;

        client
            .execute(
                query,
                &[
                    &total_pools,
                    &stats.total_volume_24h,
                    &total_txns_24h,
                    &last_indexed_block,
                    &stats.ready,
                    &stats.started_at,
                    &stats.eth_price_usd,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to upsert indexer stats: {:?}", e);
                e
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_clauses_numbering() {
        assert_eq!(values_clauses(1, 3), "($1, $2, $3)");
        assert_eq!(values_clauses(2, 2), "($1, $2), ($3, $4)");
    }

    #[test]
    fn test_sanitize_string_strips_null_bytes() {
        assert_eq!(sanitize_string("ab\0c"), "abc");
        assert_eq!(sanitize_string("clean"), "clean");
    }
}
