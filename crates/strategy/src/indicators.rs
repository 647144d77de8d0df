//! Technical indicators over price windows ordered oldest first.
//!
//! Every function returns `None` when it has too little data. Callers must
//! read that as "indicator unavailable", never as a zero reading.
//! Candle-based indicators accept anything implementing the `ta` crate's
//! OHLCV traits, so both `common::models::Candle` and `ta::DataItem` work.
//! Bands, the stochastic range and true range run through `ta`'s streaming
//! indicators fed with just the window; RSI, EMA and MACD are computed here
//! because `ta` smooths them differently.

use common::models::{BollingerValues, MacdValues, StochasticValues, VolumeProfile};
use ta::indicators::{BollingerBands, Maximum, Minimum, TrueRange};
use ta::{Close, High, Low, Next, Volume};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BB_PERIOD: usize = 20;
pub const BB_STD_DEV: f64 = 2.0;
pub const STOCH_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const VOLUME_SPIKE_THRESHOLD: f64 = 2.0;

const VOLUME_WINDOW: usize = 20;
const VALUE_AREA_SHARE: f64 = 0.7;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn closes<T: Close>(candles: &[T]) -> Vec<f64> {
    candles.iter().map(|c| c.close()).collect()
}

pub fn volumes<T: Volume>(candles: &[T]) -> Vec<f64> {
    candles.iter().map(|c| c.volume()).collect()
}

/// Mean of the last `period` prices, or of all of them when fewer exist.
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || period == 0 {
        return None;
    }
    let start = prices.len().saturating_sub(period);
    Some(mean(&prices[start..]))
}

/// EMA seeded with the mean of the first `period` prices. Falls back to the
/// plain mean when fewer than `period` prices exist.
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if prices.is_empty() || period == 0 {
        return None;
    }
    if prices.len() < period {
        return Some(mean(prices));
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = mean(&prices[..period]);
    Some(
        prices[period..]
            .iter()
            .fold(seed, |ema, &price| (price - ema) * multiplier + ema),
    )
}

/// Simple-average RSI over the last `period` deltas.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line, signal line and histogram.
///
/// The signal line is the EMA of MACD values recomputed from scratch over
/// every prefix `prices[..i]`, `i` in `slow..=len`. That is quadratic in
/// the window length and is not an incremental EMA of the MACD series.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdValues> {
    if prices.len() < slow + signal {
        return None;
    }

    let line = ema(prices, fast)? - ema(prices, slow)?;

    let history: Vec<f64> = (slow..=prices.len())
        .filter_map(|i| Some(ema(&prices[..i], fast)? - ema(&prices[..i], slow)?))
        .collect();

    let signal_line = if history.len() >= signal {
        ema(&history, signal)?
    } else {
        line
    };

    // A signal line of exactly zero reports a flat histogram.
    let histogram = if signal_line != 0.0 {
        line - signal_line
    } else {
        0.0
    };

    Some(MacdValues {
        macd: line,
        signal: signal_line,
        histogram,
    })
}

/// Bollinger bands with a population standard deviation. `%B` is not clamped
/// and leaves `[0, 1]` when the last price is outside the bands.
pub fn bollinger_bands(prices: &[f64], period: usize, std_dev: f64) -> Option<BollingerValues> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let mut bb = BollingerBands::new(period, std_dev).ok()?;
    let bands = prices[prices.len() - period..]
        .iter()
        .map(|&price| bb.next(price))
        .last()?;

    let (upper, middle, lower) = (bands.upper, bands.average, bands.lower);
    let width = upper - lower;

    let bandwidth = if middle != 0.0 { width / middle } else { 0.0 };
    let last = prices[prices.len() - 1];
    let percent_b = if width != 0.0 {
        (last - lower) / width
    } else {
        0.5
    };

    Some(BollingerValues {
        upper,
        middle,
        lower,
        bandwidth,
        percent_b,
    })
}

/// Stochastic %K over the last `period` candles. %D is not smoothed and is
/// reported equal to %K.
pub fn stochastic<T: High + Low + Close>(candles: &[T], period: usize) -> Option<StochasticValues> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let mut max = Maximum::new(period).ok()?;
    let mut min = Minimum::new(period).ok()?;
    let (mut highest, mut lowest) = (f64::MIN, f64::MAX);
    for candle in &candles[candles.len() - period..] {
        highest = max.next(candle);
        lowest = min.next(candle);
    }
    if highest == lowest {
        return None;
    }

    let close = candles[candles.len() - 1].close();
    let k = 100.0 * ((close - lowest) / (highest - lowest));
    Some(StochasticValues { k, d: k })
}

/// Mean true range over the last `period` candle-to-candle transitions.
pub fn atr<T: High + Low + Close>(candles: &[T], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let window = &candles[candles.len() - period - 1..];
    let mut tr = TrueRange::new();
    // The first candle only primes the previous close.
    tr.next(&window[0]);
    let total: f64 = window[1..].iter().map(|candle| tr.next(candle)).sum();

    Some(total / period as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSpike {
    pub is_spike: bool,
    pub ratio: f64,
}

/// Compares the last volume with the mean of the 19 before it.
pub fn volume_spike(volumes: &[f64], threshold: f64) -> VolumeSpike {
    if volumes.len() < VOLUME_WINDOW {
        return VolumeSpike {
            is_spike: false,
            ratio: 1.0,
        };
    }

    let last = volumes.len() - 1;
    let average = mean(&volumes[last + 1 - VOLUME_WINDOW..last]);
    let ratio = if average > 0.0 {
        volumes[last] / average
    } else {
        1.0
    };

    VolumeSpike {
        is_spike: ratio > threshold,
        ratio,
    }
}

/// Point of control and the price range holding the first 70% of volume.
pub fn volume_profile(prices: &[f64], volumes: &[f64]) -> Option<VolumeProfile> {
    if prices.len() < VOLUME_WINDOW || volumes.len() < VOLUME_WINDOW {
        return None;
    }

    let pairs: Vec<(f64, f64)> = prices.iter().copied().zip(volumes.iter().copied()).collect();

    // First sample wins a tie for the largest volume.
    let poc = pairs
        .iter()
        .fold(None::<(f64, f64)>, |best, &(price, volume)| match best {
            Some((_, best_volume)) if best_volume >= volume => best,
            _ => Some((price, volume)),
        })
        .map(|(price, _)| price)?;

    let mut by_price = pairs.clone();
    by_price.sort_by(|a, b| a.0.total_cmp(&b.0));

    let target = pairs.iter().map(|(_, v)| v).sum::<f64>() * VALUE_AREA_SHARE;
    let mut accumulated = 0.0;
    let mut area: Option<(f64, f64)> = None;
    for (price, volume) in by_price {
        if accumulated >= target {
            break;
        }
        area = Some(match area {
            Some((low, _)) => (low, price),
            None => (price, price),
        });
        accumulated += volume;
    }

    let (value_area_low, value_area_high) = area?;
    Some(VolumeProfile {
        poc,
        value_area_high,
        value_area_low,
    })
}
