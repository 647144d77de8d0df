use serde::{Deserialize, Serialize};

/// One OHLCV interval of one symbol, oldest first when held in a slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
}

impl Candle {
    /// Candle without exchange timing fields, mostly useful for synthetic series.
    pub fn from_ohlcv(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume,
            close_time: 0,
            quote_volume: close * volume,
        }
    }
}

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}
