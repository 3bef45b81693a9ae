//! SOL/USD price source.
//!
//! The engine only needs a "current price, possibly slightly stale" value,
//! so the HTTP source caches the last good read behind a TTL and degrades to
//! the previous value (or a fixed fallback constant) when the upstream is
//! unreachable. Ingestion never blocks on this beyond one HTTP timeout.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::decoder::WSOL_MINT;

/// Used until the first successful fetch, and whenever no fetch has ever
/// succeeded.
pub const DEFAULT_SOL_PRICE_USD: f64 = 150.0;

#[async_trait]
pub trait SolPriceSource: Send + Sync {
    /// Current SOL/USD price. Allowed to be cached/slightly stale; never
    /// fails, falling back to the last known or default value instead.
    async fn current_price_usd(&self) -> f64;
}

/// Fixed price for tests and offline runs.
pub struct FixedSolPrice(pub f64);

#[async_trait]
impl SolPriceSource for FixedSolPrice {
    async fn current_price_usd(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Deserialize)]
struct PricePair {
    #[serde(rename = "priceUsd")]
    price_usd: String,
    #[serde(rename = "quoteToken")]
    quote_token: PriceQuoteToken,
}

#[derive(Debug, Deserialize)]
struct PriceQuoteToken {
    symbol: String,
}

/// DexScreener-backed SOL/USD source with a TTL cache.
pub struct HttpSolPriceSource {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    cache: Mutex<Option<(Instant, f64)>>,
}

impl HttpSolPriceSource {
    pub fn new(base_url: &str, ttl: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/token-pairs/v1/solana/{}", base_url.trim_end_matches('/'), WSOL_MINT),
            ttl,
            cache: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(format!("price API error: {}", response.status()).into());
        }

        let pairs: Vec<PricePair> = response.json().await?;
        let pair = pairs
            .iter()
            .find(|p| p.quote_token.symbol.starts_with("USD"))
            .or_else(|| pairs.first())
            .ok_or("no SOL pair in price response")?;

        let price: f64 = pair.price_usd.parse()?;
        if !price.is_finite() || price <= 0.0 {
            return Err(format!("implausible SOL price: {}", pair.price_usd).into());
        }
        Ok(price)
    }
}

#[async_trait]
impl SolPriceSource for HttpSolPriceSource {
    async fn current_price_usd(&self) -> f64 {
        let mut cache = self.cache.lock().await;

        if let Some((fetched_at, price)) = *cache {
            if fetched_at.elapsed() < self.ttl {
                return price;
            }
        }

        match self.fetch().await {
            Ok(price) => {
                *cache = Some((Instant::now(), price));
                price
            }
            Err(e) => {
                let stale = cache.as_ref().map(|&(_, price)| price);
                log::warn!(
                    "⚠️ SOL price fetch failed ({}); using {}",
                    e,
                    if stale.is_some() { "last known value" } else { "default fallback" }
                );
                stale.unwrap_or(DEFAULT_SOL_PRICE_USD)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_source() {
        let source = FixedSolPrice(123.45);
        assert_eq!(source.current_price_usd().await, 123.45);
    }

    #[tokio::test]
    async fn test_http_source_falls_back_when_unreachable() {
        // Discard port on localhost: the request fails fast without a server.
        let source =
            HttpSolPriceSource::new("http://127.0.0.1:9", Duration::from_secs(60)).unwrap();
        assert_eq!(source.current_price_usd().await, DEFAULT_SOL_PRICE_USD);
    }
}
