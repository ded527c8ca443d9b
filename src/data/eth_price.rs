//! External ETH/USD price source.
//!
//! The numeraire's own USD price anchors every other USD figure in the
//! store. Fetched from CoinGecko with a short cache to bound call volume;
//! on failure the last known price is reused so pricing keeps working
//! through provider outages.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use moka::future::Cache;
use serde::Deserialize;

const COINGECKO_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd";

/// Cache TTL for the fetched price (30 seconds)
const PRICE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Fallback before the first successful fetch
const DEFAULT_ETH_PRICE_USD: f64 = 3000.0;

#[derive(Deserialize)]
struct SimplePriceResponse {
    ethereum: UsdQuote,
}

#[derive(Deserialize)]
struct UsdQuote {
    usd: f64,
}

/// Cached ETH/USD price fetcher.
pub struct EthPriceFetcher {
    http: reqwest::Client,
    cache: Cache<&'static str, f64>,
    last_price: Mutex<f64>,
}

impl Default for EthPriceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EthPriceFetcher {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(PRICE_CACHE_TTL)
            .build();

        Self {
            http: reqwest::Client::new(),
            cache,
            last_price: Mutex::new(DEFAULT_ETH_PRICE_USD),
        }
    }

    /// Current ETH price in USD. Never fails: falls back to the last
    /// known price (or the startup default) when the fetch errors.
    pub async fn usd_price(&self) -> f64 {
        if let Some(price) = self.cache.get("eth").await {
            return price;
        }

        match self.fetch().await {
            Ok(price) => {
                self.cache.insert("eth", price).await;
                *self.last_price.lock().unwrap_or_else(|e| e.into_inner()) = price;
                price
            },
            Err(e) => {
                warn!("ETH price fetch failed, using last known price: {e:#}");
                *self.last_price.lock().unwrap_or_else(|e| e.into_inner())
            },
        }
    }

    async fn fetch(&self) -> Result<f64> {
        let resp: SimplePriceResponse = self
            .http
            .get(COINGECKO_URL)
            .send()
            .await
            .context("CoinGecko request failed")?
            .error_for_status()
            .context("CoinGecko returned error status")?
            .json()
            .await
            .context("Invalid CoinGecko response body")?;

        let price = resp.ethereum.usd;
        if !(price.is_finite() && price > 0.0) {
            anyhow::bail!("CoinGecko returned a non-positive price: {price}");
        }
        Ok(price)
    }
}
