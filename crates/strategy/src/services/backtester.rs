use common::models::{Candle, SignalKind};
use serde::Serialize;
use tracing::info;

use super::signal_generator::{MIN_CANDLES, SIGNAL_THRESHOLD, SignalGenerator};

const POSITION_FRACTION: f64 = 0.05;
const HOLD_CANDLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestTrade {
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub signal_confidence: f64,
    pub open_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestReport {
    pub fn log_summary(&self) {
        info!(
            symbol = %self.symbol,
            trades = self.total_trades,
            win_rate = format!("{:.1}%", self.win_rate),
            total_return = format!("{:.2}%", self.total_return_pct),
            max_drawdown = format!("{:.2}%", self.max_drawdown_pct),
            "Backtest finished"
        );
    }
}

/// Replays candles through the signal generator. Every BUY at or above the
/// threshold puts 5% of the balance in and exits ten candles later, or on
/// the last candle when the series ends first.
pub struct Backtester {
    generator: SignalGenerator,
}

impl Backtester {
    pub fn new(generator: SignalGenerator) -> Self {
        Self { generator }
    }

    pub fn run(&mut self, candles: &[Candle], symbol: &str, initial_balance: f64) -> BacktestReport {
        info!(symbol, candles = candles.len(), "Starting backtest");

        let mut balance = initial_balance;
        let mut trades = Vec::new();
        let mut equity_curve = vec![initial_balance];

        for i in MIN_CANDLES..candles.len() {
            let window = &candles[i - MIN_CANDLES..=i];
            let entry_price = candles[i].close;
            let signal = self.generator.generate(window, symbol);

            if signal.signal == SignalKind::Buy
                && signal.confidence >= SIGNAL_THRESHOLD
                && entry_price > 0.0
            {
                let quantity = balance * POSITION_FRACTION / entry_price;
                let exit_price = candles[(i + HOLD_CANDLES).min(candles.len() - 1)].close;
                let pnl = (exit_price - entry_price) * quantity;

                trades.push(BacktestTrade {
                    entry_price,
                    exit_price,
                    quantity,
                    pnl,
                    pnl_pct: (exit_price - entry_price) / entry_price * 100.0,
                    signal_confidence: signal.confidence,
                    open_time: candles[i].open_time,
                });
                balance += pnl;
            }
            equity_curve.push(balance);
        }

        let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        BacktestReport {
            symbol: symbol.to_string(),
            total_trades,
            winning_trades,
            losing_trades: total_trades - winning_trades,
            win_rate,
            initial_balance,
            final_balance: balance,
            total_return_pct: (balance - initial_balance) / initial_balance * 100.0,
            max_drawdown_pct: max_drawdown_pct(&equity_curve),
            trades,
        }
    }
}

/// Largest peak-to-trough fall of an equity path, in percent of the peak.
pub fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst * 100.0
}
