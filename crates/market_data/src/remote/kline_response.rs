use common::models::Candle;
use serde::Deserialize;
use serde_json::Value;

use crate::traits::{FeedError, RemoteResponse, parse_decimal};

/// One row of `/api/v3/klines`: a positional array
/// `[open_time, open, high, low, close, volume, close_time, quote_volume, ...]`.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct KlineRow(pub Vec<Value>);

impl KlineRow {
    fn integer(&self, idx: usize, field: &'static str) -> Result<i64, FeedError> {
        self.0
            .get(idx)
            .and_then(Value::as_i64)
            .ok_or_else(|| FeedError::Malformed(format!("kline {field} missing or not an integer")))
    }

    fn decimal(&self, idx: usize, field: &'static str) -> Result<f64, FeedError> {
        match self.0.get(idx) {
            Some(Value::String(raw)) => parse_decimal(field, raw),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| FeedError::Malformed(format!("kline {field} out of range"))),
            _ => Err(FeedError::Malformed(format!("kline {field} missing"))),
        }
    }
}

impl RemoteResponse<Candle> for KlineRow {
    fn to_model(&self) -> Result<Candle, FeedError> {
        Ok(Candle {
            open_time: self.integer(0, "open_time")?,
            open: self.decimal(1, "open")?,
            high: self.decimal(2, "high")?,
            low: self.decimal(3, "low")?,
            close: self.decimal(4, "close")?,
            volume: self.decimal(5, "volume")?,
            close_time: self.integer(6, "close_time")?,
            quote_volume: self.decimal(7, "quote_volume")?,
        })
    }
}
