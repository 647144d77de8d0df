use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::models::{Candle, TickerStats};
use serde::Serialize;
use tracing::{error, warn};

use crate::traits::{FeedError, PriceFeed};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonitorStats {
    pub requests: u64,
    pub errors: u64,
    pub error_rate: f64,
}

/// Wraps a [`PriceFeed`], swallowing failures into empty results.
///
/// Every failed request is logged and counted; callers only see `None` or an
/// empty vector and are expected to skip the symbol for this cycle.
pub struct PriceMonitor {
    feed: Box<dyn PriceFeed>,
    price_cache: HashMap<String, (f64, DateTime<Utc>)>,
    request_count: u64,
    error_count: u64,
}

impl PriceMonitor {
    pub fn new(feed: Box<dyn PriceFeed>) -> Self {
        Self {
            feed,
            price_cache: HashMap::new(),
            request_count: 0,
            error_count: 0,
        }
    }

    pub async fn price(&mut self, symbol: &str) -> Option<f64> {
        self.request_count += 1;
        match self.feed.price(symbol).await {
            Ok(price) => {
                self.price_cache
                    .insert(symbol.to_string(), (price, Utc::now()));
                Some(price)
            }
            Err(e) => {
                self.record_error(&format!("price for {}", symbol), &e);
                None
            }
        }
    }

    pub async fn ticker(&mut self, symbol: &str) -> Option<TickerStats> {
        self.request_count += 1;
        match self.feed.ticker_24h(symbol).await {
            Ok(ticker) => {
                self.price_cache
                    .insert(symbol.to_string(), (ticker.price, Utc::now()));
                Some(ticker)
            }
            Err(e) => {
                self.record_error(&format!("24h ticker for {}", symbol), &e);
                None
            }
        }
    }

    pub async fn klines(&mut self, symbol: &str, interval: &str, limit: u32) -> Vec<Candle> {
        self.request_count += 1;
        match self.feed.klines(symbol, interval, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                self.record_error(&format!("klines for {}", symbol), &e);
                Vec::new()
            }
        }
    }

    /// Prices for `symbols` from a single bulk request.
    pub async fn prices(&mut self, symbols: &[String]) -> HashMap<String, f64> {
        self.request_count += 1;
        match self.feed.all_prices().await {
            Ok(mut all) => {
                all.retain(|symbol, _| symbols.contains(symbol));
                let now = Utc::now();
                for (symbol, price) in &all {
                    self.price_cache.insert(symbol.clone(), (*price, now));
                }
                all
            }
            Err(e) => {
                self.record_error("bulk prices", &e);
                HashMap::new()
            }
        }
    }

    pub fn cached_price(&self, symbol: &str) -> Option<f64> {
        self.price_cache.get(symbol).map(|(price, _)| *price)
    }

    pub fn stats(&self) -> MonitorStats {
        let error_rate = if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64 * 100.0
        } else {
            0.0
        };
        MonitorStats {
            requests: self.request_count,
            errors: self.error_count,
            error_rate,
        }
    }

    fn record_error(&mut self, what: &str, e: &FeedError) {
        self.error_count += 1;
        if e.is_rate_limit() {
            warn!("Rate limited while fetching {}: {}", what, e);
        } else {
            error!("Error fetching {}: {}", what, e);
        }
    }
}
