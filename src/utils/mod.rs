//! Utility functions for the Megascan indexer.
//!
//! - [`validation`] - Price/volume sanity bounds and helper functions
//! - [`conversion`] - Type conversions (U256, f64, hex encoding)
//! - [`price`] - Kumbaya V3 price math (sqrtPriceX96, swap classification)

mod conversion;
mod price;
mod validation;

pub use conversion::{hex_encode, u256_to_f64};

pub use price::{
    classify_swap, pool_liquidity_usd, sqrt_price_x96_to_price, token_price_usd, ClassifiedSwap,
};

pub use validation::{
    validate_price_ratio, validate_usd_price, validate_usd_volume, MAX_PRICE_RATIO,
    MAX_TOKEN_USD_PRICE, MAX_VOLUME_USD,
};
