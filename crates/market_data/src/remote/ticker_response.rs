use common::models::TickerStats;
use serde::Deserialize;

use crate::traits::{FeedError, RemoteResponse, parse_decimal};

#[derive(Debug, Deserialize)]
pub struct PriceTickerResponse {
    pub symbol: String,
    pub price: String,
}

impl RemoteResponse<f64> for PriceTickerResponse {
    fn to_model(&self) -> Result<f64, FeedError> {
        parse_decimal("price", &self.price)
    }
}

#[derive(Debug, Deserialize)]
pub struct Ticker24hResponse {
    pub symbol: String,
    #[serde(rename(deserialize = "lastPrice"))]
    pub last_price: String,
    #[serde(rename(deserialize = "priceChangePercent"))]
    pub price_change_percent: String,
    #[serde(rename(deserialize = "highPrice"))]
    pub high_price: String,
    #[serde(rename(deserialize = "lowPrice"))]
    pub low_price: String,
    pub volume: String,
}

impl RemoteResponse<TickerStats> for Ticker24hResponse {
    fn to_model(&self) -> Result<TickerStats, FeedError> {
        Ok(TickerStats {
            symbol: self.symbol.clone(),
            price: parse_decimal("lastPrice", &self.last_price)?,
            change_24h_pct: parse_decimal("priceChangePercent", &self.price_change_percent)?,
            high_24h: parse_decimal("highPrice", &self.high_price)?,
            low_24h: parse_decimal("lowPrice", &self.low_price)?,
            volume: parse_decimal("volume", &self.volume)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_24h_ticker_parses_decimal_strings() {
        let raw = r#"{
            "symbol": "ETHUSDT",
            "priceChange": "-94.99",
            "priceChangePercent": "-2.797",
            "lastPrice": "3301.01",
            "highPrice": "3420.00",
            "lowPrice": "3280.50",
            "volume": "412345.123"
        }"#;
        let ticker: Ticker24hResponse = serde_json::from_str(raw).unwrap();
        let stats = ticker.to_model().unwrap();

        assert_eq!(stats.symbol, "ETHUSDT");
        assert_eq!(stats.price, 3301.01);
        assert_eq!(stats.change_24h_pct, -2.797);
        assert!(!stats.is_significant_move(5.0));
    }

    #[test]
    fn test_bad_price_is_malformed() {
        let ticker = PriceTickerResponse {
            symbol: "BTCUSDT".to_string(),
            price: "n/a".to_string(),
        };
        assert!(matches!(ticker.to_model(), Err(FeedError::Malformed(_))));
    }
}
