use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub strength: u8,
    pub sma_10: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
}

impl TrendAnalysis {
    pub fn neutral() -> Self {
        Self {
            direction: TrendDirection::Neutral,
            strength: 0,
            sma_10: None,
            sma_20: None,
            sma_50: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValues {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerValues {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub bandwidth: f64,
    pub percent_b: f64,
}

/// `d` is not smoothed and always equals `k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticValues {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub poc: f64,
    pub value_area_high: f64,
    pub value_area_low: f64,
}

/// Indicator values a signal was derived from. `None` means the indicator
/// had too little data, not that it was zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub sma_10: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValues>,
    pub bollinger_bands: Option<BollingerValues>,
    pub stochastic: Option<StochasticValues>,
    pub atr: Option<f64>,
    pub volume_spike: bool,
    pub volume_ratio: f64,
    pub volume_profile: Option<VolumeProfile>,
    pub trend: TrendAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub signal: SignalKind,
    pub confidence: f64,
    pub reason: String,
    pub indicators: Option<IndicatorSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn hold(symbol: &str, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            signal: SignalKind::Hold,
            confidence: 0.0,
            reason: reason.to_string(),
            indicators: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_actionable(&self, kind: SignalKind, min_confidence: f64) -> bool {
        self.signal == kind && self.confidence >= min_confidence
    }
}
