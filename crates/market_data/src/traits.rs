use async_trait::async_trait;
use common::models::{Candle, TickerStats};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FeedError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Status { status: 429 | 418, .. })
    }
}

/// Source of prices and candles for the bot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<f64, FeedError>;

    async fn ticker_24h(&self, symbol: &str) -> Result<TickerStats, FeedError>;

    /// Candles ordered oldest first.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32)
    -> Result<Vec<Candle>, FeedError>;

    async fn all_prices(&self) -> Result<HashMap<String, f64>, FeedError>;
}

/// Wire-format response that converts into a domain model.
pub trait RemoteResponse<T> {
    fn to_model(&self) -> Result<T, FeedError>;
}

/// Parses one of Binance's stringly-typed decimals.
pub(crate) fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, FeedError> {
    raw.parse::<f64>()
        .map_err(|_| FeedError::Malformed(format!("{field} is not a number: {raw:?}")))
}
