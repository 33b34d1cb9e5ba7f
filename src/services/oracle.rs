//! Price Oracle Adapter
//!
//! Single price surface for game engines and the rest of the server.
//! Quotes come from an upstream HTTP feed and are reused for a short
//! window. The adapter never fails: when the feed is down it degrades
//! to the last known price and finally to a deterministic synthetic
//! quote, with the source tagged on every quote so consumers can tell
//! what they got.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Feed returned non-positive price for {0}")]
    NonPositive(String),
}

/// Where a quote came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Fresh from the upstream feed
    Feed,
    /// Reused within the cache window
    Cached,
    /// Feed down, last known price older than the window
    Stale,
    /// Feed down and nothing cached, deterministic placeholder
    Synthetic,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub asset: String,
    pub price: Decimal,
    pub source: PriceSource,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch(&self, asset: &str) -> Result<Decimal, PriceFeedError>;
}

// ============ HTTP Feed ============

#[derive(Debug, Deserialize)]
struct FeedResponse {
    price: Decimal,
}

/// Upstream feed speaking GET {base}/v1/prices/{symbol}, symbol with the
/// slash folded to a dash (ETH/USD -> ETH-USD)
pub struct HttpPriceFeed {
    client: Client,
    base_url: String,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build price feed client, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch(&self, asset: &str) -> Result<Decimal, PriceFeedError> {
        let symbol = asset.replace('/', "-");
        let url = format!("{}/v1/prices/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceFeedError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PriceFeedError::Request(format!(
                "Feed returned HTTP {}",
                response.status()
            )));
        }

        let body: FeedResponse = response
            .json()
            .await
            .map_err(|e| PriceFeedError::Malformed(e.to_string()))?;

        if body.price <= Decimal::ZERO {
            return Err(PriceFeedError::NonPositive(asset.to_string()));
        }

        Ok(body.price)
    }
}

// ============ Oracle ============

struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    cache: DashMap<String, CachedPrice>,
    cache_window: Duration,
}

impl PriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, cache_window_ms: u64) -> Self {
        Self {
            feed,
            cache: DashMap::new(),
            cache_window: Duration::from_millis(cache_window_ms),
        }
    }

    /// Current price, reusing a quote fetched within the cache window
    pub async fn get_price(&self, asset: &str) -> PriceQuote {
        if let Some(cached) = self.cache.get(asset) {
            if cached.fetched_at.elapsed() <= self.cache_window {
                return PriceQuote {
                    asset: asset.to_string(),
                    price: cached.price,
                    source: PriceSource::Cached,
                    fetched_at: cached.fetched_at_utc,
                };
            }
        }
        self.fetch_with_fallback(asset).await
    }

    /// Drop any cached quote and fetch. Settlement boundaries use this so
    /// start and end prices are never the same cached read
    pub async fn get_fresh_price(&self, asset: &str) -> PriceQuote {
        self.cache.remove(asset);
        self.fetch_with_fallback(asset).await
    }

    /// Last known price regardless of age, None if never fetched
    pub fn last_price(&self, asset: &str) -> Option<Decimal> {
        self.cache.get(asset).map(|c| c.price)
    }

    async fn fetch_with_fallback(&self, asset: &str) -> PriceQuote {
        match self.feed.fetch(asset).await {
            Ok(price) => {
                let now = Utc::now();
                self.cache.insert(
                    asset.to_string(),
                    CachedPrice {
                        price,
                        fetched_at: Instant::now(),
                        fetched_at_utc: now,
                    },
                );
                debug!("Fetched {} = {}", asset, price);
                PriceQuote {
                    asset: asset.to_string(),
                    price,
                    source: PriceSource::Feed,
                    fetched_at: now,
                }
            }
            Err(e) => {
                counter!("duel_price_feed_errors_total").increment(1);
                warn!("Price feed failed for {}: {}", asset, e);

                if let Some(cached) = self.cache.get(asset) {
                    return PriceQuote {
                        asset: asset.to_string(),
                        price: cached.price,
                        source: PriceSource::Stale,
                        fetched_at: cached.fetched_at_utc,
                    };
                }

                PriceQuote {
                    asset: asset.to_string(),
                    price: synthetic_price(asset),
                    source: PriceSource::Synthetic,
                    fetched_at: Utc::now(),
                }
            }
        }
    }
}

/// Deterministic placeholder when no real quote was ever seen. Known pairs
/// get a plausible magnitude, anything else a stable hash-derived value.
pub fn synthetic_price(asset: &str) -> Decimal {
    match asset.to_uppercase().as_str() {
        "BTC/USD" => Decimal::from(65_000),
        "ETH/USD" => Decimal::from(3_200),
        "SOL/USD" => Decimal::from(150),
        other => {
            let seed: u64 = other
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            Decimal::from(10 + seed % 990)
        }
    }
}
