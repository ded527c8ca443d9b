//! Price and volume sanity bounds.
//!
//! These bounds catch calculation errors (decimal mistakes, inverted
//! ratios) while allowing legitimate extreme values. Derived metrics that
//! fail validation are stored as 0 rather than poisoning the store.

/// Maximum reasonable price ratio between two tokens (token1/token0).
/// 1e12 allows for extreme pairs while catching decimal errors.
pub const MAX_PRICE_RATIO: f64 = 1e12;

/// Minimum reasonable price ratio. Inverse of MAX_PRICE_RATIO.
pub const MIN_PRICE_RATIO: f64 = 1e-12;

/// Maximum reasonable token price in USD.
pub const MAX_TOKEN_USD_PRICE: f64 = 1e6;

/// Maximum reasonable USD value for a single swap.
pub const MAX_VOLUME_USD: f64 = 1e9;

/// Validate a price ratio (token1/token0) is within reasonable bounds.
/// Returns Some(price) if valid, None if invalid.
#[inline]
pub fn validate_price_ratio(price: f64) -> Option<f64> {
    if price > 0.0 && price.is_finite() && price >= MIN_PRICE_RATIO && price <= MAX_PRICE_RATIO {
        Some(price)
    } else {
        None
    }
}

/// Validate a USD price is within reasonable bounds.
/// Returns the price if valid, 0.0 if invalid.
#[inline]
pub fn validate_usd_price(price: f64) -> f64 {
    if price > 0.0 && price.is_finite() && price <= MAX_TOKEN_USD_PRICE {
        price
    } else {
        0.0
    }
}

/// Validate a USD volume is within reasonable bounds.
/// Returns the volume if valid, 0.0 if invalid.
#[inline]
pub fn validate_usd_volume(volume: f64) -> f64 {
    if volume >= 0.0 && volume.is_finite() && volume <= MAX_VOLUME_USD {
        volume
    } else {
        0.0
    }
}
