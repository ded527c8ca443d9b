//! Swap event to Trade conversion, shared by backfill and the live poller.

use alloy::primitives::U256;
use alloy::rpc::types::Log;

use crate::abis::kumbaya;
use crate::store::Trade;
use crate::utils::{
    classify_swap, hex_encode, token_price_usd, u256_to_f64, validate_usd_price,
    validate_usd_volume,
};

/// MegaETH EVM block cadence, used to extrapolate wall-clock timestamps
/// for events whose block timestamps are not fetched.
pub(crate) const BLOCK_TIME_SECS: i64 = 1;

/// Which side of a pair is WETH. `None` when neither side is: such pools
/// have no numeraire leg, their swaps cannot be priced in USD, and every
/// ingestion path must skip them.
pub(crate) fn weth_position(token0: &str, token1: &str, weth: &str) -> Option<bool> {
    if token0 == weth {
        Some(true)
    } else if token1 == weth {
        Some(false)
    } else {
        None
    }
}

/// Build a classified Trade from a decoded Swap event.
///
/// Returns None for swaps that cannot be priced (zero or out-of-bounds
/// price, missing transaction hash); callers count these as skipped.
#[allow(clippy::too_many_arguments)]
pub(crate) fn trade_from_swap(
    pool_address: &str,
    log: &Log,
    event: &kumbaya::Swap,
    is_token0_weth: bool,
    decimals0: u8,
    decimals1: u8,
    eth_price_usd: f64,
    head_block: u64,
    now_secs: i64,
) -> Option<Trade> {
    let tx_hash = hex_encode(log.transaction_hash?.as_slice());
    let log_index = log.log_index?;
    let block_number = log.block_number.unwrap_or(head_block);

    let classified = classify_swap(event.amount0, event.amount1, is_token0_weth);

    let token_decimals = if is_token0_weth { decimals1 } else { decimals0 };
    let amount_eth = u256_to_f64(classified.abs_amount_weth, 18);
    let amount_token = u256_to_f64(classified.abs_amount_token, token_decimals);

    let sqrt_price_x96 = event.sqrtPriceX96.to::<U256>();
    let price = validate_usd_price(token_price_usd(
        sqrt_price_x96,
        decimals0,
        decimals1,
        is_token0_weth,
        eth_price_usd,
    ));
    if price == 0.0 {
        return None;
    }
    let value_usd = validate_usd_volume(amount_eth * eth_price_usd);

    // Estimate wall-clock time from block distance to the head
    let block_delta = head_block.saturating_sub(block_number) as i64;
    let timestamp = now_secs - block_delta * BLOCK_TIME_SECS;

    Some(Trade {
        id: format!("{tx_hash}-{log_index}"),
        pool_address: pool_address.to_lowercase(),
        tx_hash,
        block_number,
        timestamp,
        side: classified.side,
        price,
        amount_token,
        amount_eth,
        value_usd,
        maker: hex_encode(event.sender.as_slice()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{
        aliases::{I24, U160},
        Address, B256, I256,
    };
    use crate::store::SwapSide;

    const WETH: &str = "0x4200000000000000000000000000000000000006";

    fn swap_event(amount0: i128, amount1: i128) -> kumbaya::Swap {
        kumbaya::Swap {
            sender: Address::repeat_byte(0x22),
            recipient: Address::ZERO,
            amount0: I256::try_from(amount0).unwrap(),
            amount1: I256::try_from(amount1).unwrap(),
            // ratio 1.0 with equal decimals
            sqrtPriceX96: U160::from(1u64) << 96,
            liquidity: 1_000,
            tick: I24::ZERO,
        }
    }

    fn rpc_log() -> Log {
        Log {
            transaction_hash: Some(B256::repeat_byte(0x11)),
            log_index: Some(3),
            block_number: Some(90),
            ..Default::default()
        }
    }

    #[test]
    fn test_weth_position_identifies_numeraire_side() {
        assert_eq!(weth_position(WETH, "0xaa", WETH), Some(true));
        assert_eq!(weth_position("0xaa", WETH, WETH), Some(false));
    }

    #[test]
    fn test_weth_position_rejects_unpaired_pools() {
        // Without a WETH leg there is no numeraire and nothing to price
        assert_eq!(weth_position("0xaa", "0xbb", WETH), None);
    }

    #[test]
    fn test_trade_from_swap_weth_pair() {
        // 1 WETH leaves the pool (token1), 1 token enters: a sell
        let event = swap_event(1_000_000_000_000_000_000, -1_000_000_000_000_000_000);
        let trade = trade_from_swap(
            "0xPool", &rpc_log(), &event, false, 18, 18, 3000.0, 100, 2_000_000,
        )
        .unwrap();

        assert_eq!(trade.side, SwapSide::Sell);
        assert!((trade.price - 3000.0).abs() < 1e-6);
        assert!((trade.amount_eth - 1.0).abs() < 1e-12);
        assert!((trade.value_usd - 3000.0).abs() < 1e-6);
        assert_eq!(trade.pool_address, "0xpool");
        // 10 blocks behind head at 1s/block
        assert_eq!(trade.timestamp, 2_000_000 - 10);
        assert!(trade.id.ends_with("-3"));
    }

    #[test]
    fn test_trade_from_swap_requires_transaction_hash() {
        let event = swap_event(1, -1);
        let mut log = rpc_log();
        log.transaction_hash = None;
        assert!(trade_from_swap("0xpool", &log, &event, false, 18, 18, 3000.0, 100, 0).is_none());
    }
}
