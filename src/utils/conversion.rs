//! Type conversion and formatting utilities.
//!
//! Conversions from raw 256-bit chain values to f64 happen here, using
//! BigDecimal so precision is only dropped at the final step.

use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Convert U256 to f64 with decimal adjustment using BigDecimal for precision.
///
/// Avoids the precision loss of a direct f64 cast for values above 2^53.
/// Returns 0.0 if the adjusted value is not a finite f64.
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    u256_to_f64_safe(value, decimals).unwrap_or(0.0)
}

fn u256_to_f64_safe(value: U256, decimals: u8) -> Option<f64> {
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let big_value = BigDecimal::from(big_int);

    let adjusted = big_value / big_pow10(decimals);

    let result = adjusted.to_f64()?;

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_f64_one_ether() {
        let value = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(u256_to_f64(value, 18), 1.0);
    }

    #[test]
    fn test_u256_to_f64_no_decimals() {
        assert_eq!(u256_to_f64(U256::from(42u64), 0), 42.0);
    }

    #[test]
    fn test_hex_encode_lowercase() {
        assert_eq!(hex_encode(&[0xAB, 0xCD]), "0xabcd");
    }
}
