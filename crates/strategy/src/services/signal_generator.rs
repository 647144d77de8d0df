use std::collections::VecDeque;

use chrono::Utc;
use common::models::{
    Candle, IndicatorSnapshot, Signal, SignalKind, TrendAnalysis, TrendDirection,
};
use serde::Serialize;
use tracing::debug;

use crate::indicators::{self, *};

pub const MIN_CANDLES: usize = 50;
pub const SIGNAL_THRESHOLD: f64 = 0.6;

const HISTORY_LEN: usize = 100;
const TOTAL_WEIGHT: f64 = 11.0;
const MAX_REASONS: usize = 3;

const INSUFFICIENT_DATA: &str = "Insufficient data (need 50+ candles)";
const MIXED_INDICATORS: &str = "No clear signal - mixed indicators";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalStats {
    pub total: usize,
    pub buys: usize,
    pub sells: usize,
    pub holds: usize,
    pub avg_confidence: f64,
}

#[derive(Default)]
struct Score {
    buy: f64,
    sell: f64,
    reasons: Vec<String>,
}

impl Score {
    fn buy(&mut self, weight: f64, reason: Option<String>) {
        self.buy += weight;
        self.reasons.extend(reason);
    }

    fn sell(&mut self, weight: f64, reason: Option<String>) {
        self.sell += weight;
        self.reasons.extend(reason);
    }

    fn reason(&self, fallback: &str) -> String {
        if self.reasons.is_empty() {
            return fallback.to_string();
        }
        self.reasons
            .iter()
            .take(MAX_REASONS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Scores a candle window into a BUY/SELL/HOLD call and keeps a short
/// history of what it produced.
pub struct SignalGenerator {
    history: VecDeque<Signal>,
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// SMA10 > SMA20 > SMA50 is an uptrend, the strict reverse a downtrend.
    pub fn trend_strength(candles: &[Candle]) -> TrendAnalysis {
        if candles.len() < MIN_CANDLES {
            return TrendAnalysis::neutral();
        }

        let closes = indicators::closes(candles);
        let sma_10 = sma(&closes, 10);
        let sma_20 = sma(&closes, 20);
        let sma_50 = sma(&closes, 50);

        let direction = match (sma_10, sma_20, sma_50) {
            (Some(a), Some(b), Some(c)) if a > b && b > c => TrendDirection::Up,
            (Some(a), Some(b), Some(c)) if a < b && b < c => TrendDirection::Down,
            _ => TrendDirection::Neutral,
        };

        TrendAnalysis {
            direction,
            strength: u8::from(direction != TrendDirection::Neutral),
            sma_10,
            sma_20,
            sma_50,
        }
    }

    pub fn snapshot(candles: &[Candle]) -> IndicatorSnapshot {
        let closes = indicators::closes(candles);
        let volumes = indicators::volumes(candles);
        let spike = volume_spike(&volumes, VOLUME_SPIKE_THRESHOLD);

        IndicatorSnapshot {
            price: closes.last().copied().unwrap_or_default(),
            sma_10: sma(&closes, 10),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            ema_12: ema(&closes, 12),
            ema_26: ema(&closes, 26),
            rsi: rsi(&closes, RSI_PERIOD),
            macd: macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
            bollinger_bands: bollinger_bands(&closes, BB_PERIOD, BB_STD_DEV),
            stochastic: stochastic(candles, STOCH_PERIOD),
            atr: atr(candles, ATR_PERIOD),
            volume_spike: spike.is_spike,
            volume_ratio: spike.ratio,
            volume_profile: volume_profile(&closes, &volumes),
            trend: Self::trend_strength(candles),
        }
    }

    pub fn generate(&mut self, candles: &[Candle], symbol: &str) -> Signal {
        if candles.len() < MIN_CANDLES {
            return Signal::hold(symbol, INSUFFICIENT_DATA);
        }

        let snapshot = Self::snapshot(candles);
        let score = Self::score(&snapshot);

        let buy_confidence = score.buy / TOTAL_WEIGHT;
        let sell_confidence = score.sell / TOTAL_WEIGHT;

        let (kind, confidence, reason) =
            if buy_confidence >= SIGNAL_THRESHOLD && buy_confidence > sell_confidence {
                (
                    SignalKind::Buy,
                    buy_confidence.min(1.0),
                    score.reason("Multiple bullish indicators"),
                )
            } else if sell_confidence >= SIGNAL_THRESHOLD && sell_confidence > buy_confidence {
                (
                    SignalKind::Sell,
                    sell_confidence.min(1.0),
                    score.reason("Multiple bearish indicators"),
                )
            } else {
                (
                    SignalKind::Hold,
                    buy_confidence.max(sell_confidence),
                    MIXED_INDICATORS.to_string(),
                )
            };

        debug!(
            symbol,
            signal = %kind,
            buy = score.buy,
            sell = score.sell,
            "Signal scored"
        );

        let signal = Signal {
            symbol: symbol.to_string(),
            signal: kind,
            confidence,
            reason,
            indicators: Some(snapshot),
            timestamp: Utc::now(),
        };

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(signal.clone());
        signal
    }

    fn score(ind: &IndicatorSnapshot) -> Score {
        let mut score = Score::default();
        let direction = ind.trend.direction;

        match direction {
            TrendDirection::Up => score.buy(2.0, Some("Uptrend confirmed".into())),
            TrendDirection::Down => score.sell(2.0, Some("Downtrend confirmed".into())),
            TrendDirection::Neutral => {}
        }

        if let Some(rsi) = ind.rsi {
            if rsi < 30.0 {
                score.buy(2.0, Some(format!("RSI oversold ({rsi:.1})")));
            } else if rsi > 70.0 {
                score.sell(2.0, Some(format!("RSI overbought ({rsi:.1})")));
            } else if rsi > 40.0 && rsi < 60.0 {
                score.buy(0.5, None);
                score.sell(0.5, None);
            }
        }

        if let Some(m) = ind.macd {
            if m.macd > m.signal && m.histogram > 0.0 {
                score.buy(2.0, Some("MACD bullish crossover".into()));
            } else if m.macd < m.signal && m.histogram < 0.0 {
                score.sell(2.0, Some("MACD bearish crossover".into()));
            }
        }

        if let Some(bb) = ind.bollinger_bands {
            if bb.percent_b < 0.1 {
                score.buy(1.5, Some("Price near lower BB".into()));
            } else if bb.percent_b > 0.9 {
                score.sell(1.5, Some("Price near upper BB".into()));
            }
        }

        if ind.volume_spike {
            match direction {
                TrendDirection::Up => score.buy(1.5, Some("Volume spike with uptrend".into())),
                TrendDirection::Down => {
                    score.sell(1.5, Some("Volume spike with downtrend".into()))
                }
                TrendDirection::Neutral => {}
            }
        }

        if let Some(stoch) = ind.stochastic {
            if stoch.k < 20.0 {
                score.buy(1.0, Some("Stochastic oversold".into()));
            } else if stoch.k > 80.0 {
                score.sell(1.0, Some("Stochastic overbought".into()));
            }
        }

        if let (Some(fast), Some(slow)) = (ind.ema_12, ind.ema_26) {
            if fast > slow {
                score.buy(1.0, None);
            } else {
                score.sell(1.0, None);
            }
        }

        score
    }

    pub fn stats(&self) -> Option<SignalStats> {
        if self.history.is_empty() {
            return None;
        }

        let count = |kind| self.history.iter().filter(|s| s.signal == kind).count();
        let total = self.history.len();

        Some(SignalStats {
            total,
            buys: count(SignalKind::Buy),
            sells: count(SignalKind::Sell),
            holds: count(SignalKind::Hold),
            avg_confidence: self.history.iter().map(|s| s.confidence).sum::<f64>()
                / total as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn series(closes: impl Iterator<Item = f64>, last_volume: f64) -> Vec<Candle> {
        let closes: Vec<f64> = closes.collect();
        let n = closes.len();
        closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let volume = if i == n - 1 { last_volume } else { 500.0 };
                Candle::from_ohlcv(c, c + 1.0, c - 1.0, c, volume)
            })
            .collect()
    }

    /// Climbs 0.125 per candle under a five-candle swing of 4.
    fn uptrend(last_volume: f64) -> Vec<Candle> {
        series(
            (0..60).map(|i| 100.0 + 0.125 * i as f64 + 4.0 * ((i + 4) % 5) as f64),
            last_volume,
        )
    }

    fn downtrend(last_volume: f64) -> Vec<Candle> {
        series(
            (0..60).map(|i| 140.0 - 0.125 * i as f64 - 4.0 * ((i + 4) % 5) as f64),
            last_volume,
        )
    }

    fn cycle_mean(candles: &[Candle]) -> f64 {
        candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64
    }

    #[test]
    fn test_short_window_is_hold_without_indicators() {
        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&uptrend(1500.0)[..49], "BTCUSDT");

        assert_eq!(signal.signal, SignalKind::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.reason, INSUFFICIENT_DATA);
        assert!(signal.indicators.is_none());
        assert!(generator.stats().is_none());
    }

    #[test]
    fn test_uptrend_with_volume_spike_is_buy() {
        let candles = uptrend(1500.0);
        // The last full swing sits 55 candles of drift above the first.
        assert!((cycle_mean(&candles[55..]) - cycle_mean(&candles[..5]) - 6.875).abs() < EPS);

        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&candles, "BTCUSDT");

        assert_eq!(signal.signal, SignalKind::Buy);
        assert!((signal.confidence - 7.0 / 11.0).abs() < EPS);
        assert_eq!(
            signal.reason,
            "Uptrend confirmed | MACD bullish crossover | Volume spike with uptrend"
        );

        let ind = signal.indicators.unwrap();
        assert_eq!(ind.trend.direction, TrendDirection::Up);
        assert!(ind.volume_spike);
        assert!((ind.volume_ratio - 3.0).abs() < EPS);
    }

    #[test]
    fn test_downtrend_with_volume_spike_is_sell() {
        let candles = downtrend(1500.0);
        assert!((cycle_mean(&candles[..5]) - cycle_mean(&candles[55..]) - 6.875).abs() < EPS);

        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&candles, "ETHUSDT");

        assert_eq!(signal.signal, SignalKind::Sell);
        assert!((signal.confidence - 7.0 / 11.0).abs() < EPS);
        assert!(signal.reason.starts_with("Downtrend confirmed"));
    }

    #[test]
    fn test_without_volume_spike_stays_below_threshold() {
        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&uptrend(500.0), "BTCUSDT");

        assert_eq!(signal.signal, SignalKind::Hold);
        assert!((signal.confidence - 5.5 / 11.0).abs() < EPS);
        assert_eq!(signal.reason, MIXED_INDICATORS);
    }

    #[test]
    fn test_flat_series_is_hold() {
        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&series((0..60).map(|_| 100.0), 500.0), "BTCUSDT");

        assert_eq!(signal.signal, SignalKind::Hold);
        assert!((signal.confidence - 3.0 / 11.0).abs() < EPS);
        assert_eq!(signal.indicators.unwrap().trend.direction, TrendDirection::Neutral);
    }

    #[test]
    fn test_monotonic_series_is_hold_under_overbought_pressure() {
        let mut generator = SignalGenerator::new();
        let signal = generator.generate(&series((0..60).map(|i| 100.0 + i as f64), 500.0), "X");

        // Uptrend and EMA cross score 3; RSI, %B and %K overbought score 4.5.
        assert_eq!(signal.signal, SignalKind::Hold);
        assert!((signal.confidence - 4.5 / 11.0).abs() < EPS);
    }

    #[test]
    fn test_trend_strength() {
        let up = SignalGenerator::trend_strength(&uptrend(500.0));
        assert_eq!(up.direction, TrendDirection::Up);
        assert_eq!(up.strength, 1);

        let short = SignalGenerator::trend_strength(&uptrend(500.0)[..10]);
        assert_eq!(short, TrendAnalysis::neutral());
    }

    #[test]
    fn test_history_is_bounded_and_summarised() {
        let mut generator = SignalGenerator::new();
        let buy = uptrend(1500.0);
        let flat = series((0..60).map(|_| 100.0), 500.0);

        for _ in 0..60 {
            generator.generate(&buy, "BTCUSDT");
        }
        for _ in 0..60 {
            generator.generate(&flat, "BTCUSDT");
        }

        let stats = generator.stats().unwrap();
        assert_eq!(stats.total, 100);
        assert_eq!(stats.buys, 40);
        assert_eq!(stats.holds, 60);
        assert_eq!(stats.sells, 0);
        let expected = (40.0 * 7.0 / 11.0 + 60.0 * 3.0 / 11.0) / 100.0;
        assert!((stats.avg_confidence - expected).abs() < 1e-9);
    }
}
