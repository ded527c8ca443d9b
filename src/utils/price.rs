//! Price math for Kumbaya (Uniswap V3 style) pools.
//!
//! Converts sqrtPriceX96 fixed-point values to decimal prices, derives USD
//! prices through the WETH numeraire, and classifies swap direction from
//! the signed amount deltas of a Swap event.

use alloy::primitives::{I256, U256};
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

use super::conversion::big_pow10;
use super::validation::validate_price_ratio;
use crate::store::SwapSide;

/// Constant: 2^96 (Q64.96 fixed point scaling factor)
/// Value: 79228162514264337593543950336.0
pub(crate) const Q96: f64 = 79228162514264337593543950336.0;

/// 1/Q96 precomputed for faster division (multiply instead of divide)
pub(crate) const Q96_INV: f64 = 1.0 / Q96;

/// Q96 as an exact BigDecimal for the full-precision conversion path.
static Q96_BIG: Lazy<BigDecimal> =
    Lazy::new(|| BigDecimal::from(BigInt::from(2u32).pow(96)));

/// Convert sqrtPriceX96 to an adjusted price (token1 per token0).
///
/// price = (sqrtPriceX96 / 2^96)^2 * 10^(decimals0 - decimals1)
///
/// Uses BigDecimal for the squaring so the 160-bit input keeps full
/// precision until the final f64 conversion. Returns 0.0 for a zero ratio
/// (uninitialized pool) or unrepresentable decimals; callers must guard
/// against non-finite results before using them.
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    if sqrt_price_x96.is_zero() || decimals0 > 24 || decimals1 > 24 {
        return 0.0;
    }

    let bytes: [u8; 32] = sqrt_price_x96.to_le_bytes();
    let sqrt_price = BigDecimal::from(BigInt::from_bytes_le(Sign::Plus, &bytes));

    let normalized = &sqrt_price / &*Q96_BIG;
    let raw_price = &normalized * &normalized;

    let decimal_diff = decimals0 as i32 - decimals1 as i32;
    let adjusted = if decimal_diff >= 0 {
        raw_price * big_pow10(decimal_diff as u8)
    } else {
        raw_price / big_pow10((-decimal_diff) as u8)
    };

    adjusted.to_f64().unwrap_or(0.0)
}

/// Derive a token's USD price from a WETH-paired pool.
///
/// The raw pool price is token1/token0. When WETH is token0 the other
/// token's WETH price is the inverse of that ratio; when WETH is token1 it
/// is the ratio itself. Returns 0.0 when the ratio is zero (uninitialized
/// pool) or outside the sanity bounds.
pub fn token_price_usd(
    sqrt_price_x96: U256,
    decimals0: u8,
    decimals1: u8,
    is_token0_weth: bool,
    eth_price_usd: f64,
) -> f64 {
    let Some(price_token1_per_token0) =
        validate_price_ratio(sqrt_price_x96_to_price(sqrt_price_x96, decimals0, decimals1))
    else {
        return 0.0;
    };

    if is_token0_weth {
        eth_price_usd / price_token1_per_token0
    } else {
        price_token1_per_token0 * eth_price_usd
    }
}

/// Estimate a pool's USD liquidity from its in-range liquidity.
///
/// One-sided WETH estimate doubled: the WETH amount implied by the current
/// in-range liquidity at the current price, times the ETH price, times two.
/// Good enough for ranking pools on a dashboard, not an exact TVL.
pub fn pool_liquidity_usd(
    liquidity: u128,
    sqrt_price_x96: U256,
    is_token0_weth: bool,
    eth_price_usd: f64,
) -> f64 {
    if liquidity == 0 || sqrt_price_x96.is_zero() {
        return 0.0;
    }

    let sqrt_p = crate::utils::u256_to_f64(sqrt_price_x96, 0) * Q96_INV;
    let liq = liquidity as f64;
    if sqrt_p <= 0.0 || !sqrt_p.is_finite() || !liq.is_finite() {
        return 0.0;
    }

    let weth_amount = if is_token0_weth {
        // amount0 = L / sqrt(P), token0 is WETH (18 decimals)
        liq / (sqrt_p * 1e18)
    } else {
        // amount1 = L * sqrt(P)
        (liq * sqrt_p) / 1e18
    };

    let liquidity_usd = weth_amount * eth_price_usd * 2.0;
    if liquidity_usd.is_finite() {
        liquidity_usd
    } else {
        0.0
    }
}

/// A swap classified into trade direction and absolute amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedSwap {
    pub side: SwapSide,
    pub abs_amount_weth: U256,
    pub abs_amount_token: U256,
}

/// Classify a Swap event's signed deltas into buy/sell.
///
/// Amounts are pool-relative: positive means the token entered the pool,
/// negative means it left. WETH entering the pool means the counterparty
/// paid WETH for the other token, which is a buy of that token.
///
/// A zero WETH delta classifies as Sell. That mirrors the comparison the
/// exchange UI uses, but it has not been verified against the contract's
/// event semantics for exact-zero deltas.
pub fn classify_swap(amount0: I256, amount1: I256, is_token0_weth: bool) -> ClassifiedSwap {
    let (weth_amount, token_amount) = if is_token0_weth {
        (amount0, amount1)
    } else {
        (amount1, amount0)
    };

    let side = if weth_amount.is_positive() {
        SwapSide::Buy
    } else {
        SwapSide::Sell
    };

    ClassifiedSwap {
        side,
        abs_amount_weth: weth_amount.unsigned_abs(),
        abs_amount_token: token_amount.unsigned_abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // sqrtPriceX96 for price == 1.0 with equal decimals is exactly 2^96
    fn q96() -> U256 {
        U256::from_str("79228162514264337593543950336").unwrap()
    }

    #[test]
    fn test_sqrt_price_unit_ratio() {
        let price = sqrt_price_x96_to_price(q96(), 18, 18);
        assert!((price - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_price_decimal_adjustment() {
        // Same ratio, token0 has 6 decimals, token1 has 18: adjustment is 10^-12
        let price = sqrt_price_x96_to_price(q96(), 6, 18);
        assert!((price - 1e-12).abs() < 1e-24);
    }

    #[test]
    fn test_sqrt_price_zero_is_zero() {
        assert_eq!(sqrt_price_x96_to_price(U256::ZERO, 18, 18), 0.0);
    }

    #[test]
    fn test_usd_price_zero_ratio() {
        assert_eq!(token_price_usd(U256::ZERO, 18, 18, true, 3000.0), 0.0);
    }

    #[test]
    fn test_usd_price_inversion_round_trip() {
        // Property: pricing through the ratio and through its inverse with
        // the numeraire flag swapped recovers the same USD price.
        let eth = 2500.0;
        // 2 * 2^96 -> ratio 4.0
        let sqrt_ratio = q96() * U256::from(2u64);
        let direct = token_price_usd(sqrt_ratio, 18, 18, false, eth);

        // inverse ratio 0.25 -> sqrt is 2^96 / 2
        let sqrt_inverse = q96() / U256::from(2u64);
        let inverted = token_price_usd(sqrt_inverse, 18, 18, true, eth);

        assert!((direct - inverted).abs() / direct < 1e-9);
        assert!((direct - 4.0 * eth).abs() < 1e-6);
    }

    #[test]
    fn test_classify_swap_buy() {
        // WETH (token0) enters the pool, token leaves: buy of the token
        let c = classify_swap(I256::try_from(100).unwrap(), I256::try_from(-500).unwrap(), true);
        assert_eq!(c.side, SwapSide::Buy);
        assert_eq!(c.abs_amount_weth, U256::from(100u64));
        assert_eq!(c.abs_amount_token, U256::from(500u64));
    }

    #[test]
    fn test_classify_swap_antisymmetry() {
        // Property: negating both deltas flips the side, amounts unchanged.
        let a0 = I256::try_from(123_456).unwrap();
        let a1 = I256::try_from(-789_012).unwrap();
        for is_token0_weth in [true, false] {
            let fwd = classify_swap(a0, a1, is_token0_weth);
            let rev = classify_swap(-a0, -a1, is_token0_weth);
            assert_ne!(fwd.side, rev.side);
            assert_eq!(fwd.abs_amount_weth, rev.abs_amount_weth);
            assert_eq!(fwd.abs_amount_token, rev.abs_amount_token);
        }
    }

    #[test]
    fn test_classify_swap_zero_weth_delta_is_sell() {
        let c = classify_swap(I256::ZERO, I256::try_from(10).unwrap(), true);
        assert_eq!(c.side, SwapSide::Sell);
    }

    #[test]
    fn test_pool_liquidity_usd_zero_inputs() {
        assert_eq!(pool_liquidity_usd(0, q96(), true, 3000.0), 0.0);
        assert_eq!(pool_liquidity_usd(1_000_000, U256::ZERO, true, 3000.0), 0.0);
    }

    #[test]
    fn test_pool_liquidity_usd_positive() {
        // At ratio 1.0, L = 1e18 implies ~1 WETH on the weth side
        let usd = pool_liquidity_usd(1_000_000_000_000_000_000, q96(), true, 3000.0);
        assert!((usd - 6000.0).abs() < 1.0);
    }
}
