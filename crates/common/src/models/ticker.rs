use serde::{Deserialize, Serialize};

/// Rolling 24h statistics for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStats {
    pub symbol: String,
    pub price: f64,
    pub change_24h_pct: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume: f64,
}

impl TickerStats {
    pub fn is_significant_move(&self, threshold_pct: f64) -> bool {
        self.change_24h_pct.abs() > threshold_pct
    }
}
