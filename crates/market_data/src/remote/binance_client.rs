use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::models::{Candle, TickerStats};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::remote::kline_response::KlineRow;
use crate::remote::ticker_response::{PriceTickerResponse, Ticker24hResponse};
use crate::traits::{FeedError, PriceFeed, RemoteResponse};

/// Client for the public (unsigned) Binance spot REST endpoints.
#[derive(Clone)]
pub struct BinanceRestClient {
    client: Client,
    base_url: String,
}

impl BinanceRestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .user_agent("micro_scalp_bot/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: Response) -> Result<Response, FeedError> {
        let status = response.status();

        if let Some(used_weight) = response.headers().get("x-mbx-used-weight-1m") {
            match used_weight.to_str().ok().and_then(|w| w.parse::<u32>().ok()) {
                Some(w) if w > 1000 => warn!("High API weight usage: {}", w),
                Some(w) => debug!("Used weights: {}/1200", w),
                None => debug!("Unreadable weight header"),
            }
        }

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            warn!("Rate limited by Binance (HTTP {})", status.as_u16());
        }
        Err(FeedError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PriceFeed for BinanceRestClient {
    async fn price(&self, symbol: &str) -> Result<f64, FeedError> {
        let ticker: PriceTickerResponse = self
            .get_json("/api/v3/ticker/price", &[("symbol", symbol.to_uppercase())])
            .await?;
        ticker.to_model()
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<TickerStats, FeedError> {
        let ticker: Ticker24hResponse = self
            .get_json("/api/v3/ticker/24hr", &[("symbol", symbol.to_uppercase())])
            .await?;
        ticker.to_model()
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, FeedError> {
        let rows: Vec<KlineRow> = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| row.to_model()).collect()
    }

    async fn all_prices(&self) -> Result<HashMap<String, f64>, FeedError> {
        let tickers: Vec<PriceTickerResponse> = self.get_json("/api/v3/ticker/price", &[]).await?;

        let mut prices = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            let price = ticker.to_model()?;
            prices.insert(ticker.symbol, price);
        }
        Ok(prices)
    }
}
