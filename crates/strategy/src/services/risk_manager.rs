use chrono::{Local, NaiveDate};
use common::config::RiskSettings;
use common::models::TradeSide;
use serde::Serialize;
use tracing::info;

/// Stop distance as a fraction of entry when no ATR is available.
const DEFAULT_STOP_PCT: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq)]
struct DailyStats {
    loss: f64,
    loss_pct: f64,
    trades: u32,
    wins: u32,
    losses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStats {
    pub daily_loss: f64,
    pub daily_loss_pct: f64,
    pub daily_trades: u32,
    pub daily_wins: u32,
    pub daily_losses: u32,
    pub daily_win_rate: f64,
    pub remaining_trades: u32,
    pub max_daily_loss_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSize {
    pub quantity: f64,
    pub position_pct: f64,
}

/// Daily loss and trade-count limits plus volatility-aware sizing.
pub struct RiskManager {
    settings: RiskSettings,
    daily: DailyStats,
    last_reset: NaiveDate,
}

impl RiskManager {
    pub fn new(settings: RiskSettings) -> Self {
        Self::starting_on(settings, Local::now().date_naive())
    }

    pub fn starting_on(settings: RiskSettings, today: NaiveDate) -> Self {
        Self {
            settings,
            daily: DailyStats::default(),
            last_reset: today,
        }
    }

    /// Rebuilds `today`'s counters from the ledger after a restart: `opened`
    /// trades entered today and the P&L of every trade closed today.
    pub fn restore_day(
        &mut self,
        today: NaiveDate,
        opened: u32,
        closed_pnls: &[f64],
        equity: f64,
    ) {
        self.daily = DailyStats {
            trades: opened,
            ..DailyStats::default()
        };
        self.last_reset = today;
        for &pnl in closed_pnls {
            self.record_close(pnl, equity);
        }
    }

    /// Clears the daily counters once the local date moves past the last reset.
    pub fn reset_if_new_day(&mut self, today: NaiveDate) {
        if today != self.last_reset {
            self.daily = DailyStats::default();
            self.last_reset = today;
            info!("Daily risk counters reset");
        }
    }

    pub fn can_trade(&mut self) -> Result<(), String> {
        self.can_trade_on(Local::now().date_naive())
    }

    pub fn can_trade_on(&mut self, today: NaiveDate) -> Result<(), String> {
        self.reset_if_new_day(today);

        if self.daily.loss_pct >= self.settings.max_daily_loss_pct {
            return Err(format!(
                "Daily loss limit reached: {:.2}%",
                self.daily.loss_pct
            ));
        }
        if self.daily.trades >= self.settings.max_trades_per_day {
            return Err(format!(
                "Max trades per day reached: {}",
                self.settings.max_trades_per_day
            ));
        }
        Ok(())
    }

    /// Scales the max position by confidence, then shrinks it for volatile
    /// markets: ATR above 5% of price halves it, above 3% takes a quarter off.
    pub fn position_size(
        &self,
        equity: f64,
        entry_price: f64,
        atr: Option<f64>,
        confidence: f64,
    ) -> PositionSize {
        let base_pct = self.settings.max_position_pct * confidence;

        let volatility_factor = match atr {
            Some(atr) if atr > 0.0 && entry_price > 0.0 => {
                let volatility_pct = atr / entry_price * 100.0;
                if volatility_pct > 5.0 {
                    0.5
                } else if volatility_pct > 3.0 {
                    0.75
                } else {
                    1.0
                }
            }
            _ => 1.0,
        };

        let position_pct = base_pct * volatility_factor;
        let quantity = if entry_price > 0.0 {
            round_to(equity * position_pct / 100.0 / entry_price, 6)
        } else {
            0.0
        };

        PositionSize {
            quantity,
            position_pct,
        }
    }

    pub fn stop_loss(&self, entry_price: f64, side: TradeSide, atr: Option<f64>) -> f64 {
        let distance = match atr {
            Some(atr) if atr > 0.0 => atr * self.settings.atr_multiplier_sl,
            _ => entry_price * DEFAULT_STOP_PCT,
        };

        match side {
            TradeSide::Buy => entry_price - distance,
            TradeSide::Sell => entry_price + distance,
        }
    }

    pub fn take_profit(&self, entry_price: f64, side: TradeSide, stop_loss: f64) -> f64 {
        let reward = (entry_price - stop_loss).abs() * self.settings.risk_reward_ratio;

        match side {
            TradeSide::Buy => entry_price + reward,
            TradeSide::Sell => entry_price - reward,
        }
    }

    pub fn record_open(&mut self) {
        self.daily.trades += 1;
    }

    pub fn record_close(&mut self, pnl: f64, equity: f64) {
        if pnl < 0.0 {
            self.daily.loss += pnl.abs();
            self.daily.losses += 1;
        } else {
            self.daily.wins += 1;
        }

        self.daily.loss_pct = if equity > 0.0 {
            self.daily.loss / equity * 100.0
        } else {
            0.0
        };
    }

    pub fn stats(&mut self) -> RiskStats {
        self.stats_on(Local::now().date_naive())
    }

    pub fn stats_on(&mut self, today: NaiveDate) -> RiskStats {
        self.reset_if_new_day(today);

        let closed = self.daily.wins + self.daily.losses;
        let daily_win_rate = if closed > 0 {
            f64::from(self.daily.wins) / f64::from(closed) * 100.0
        } else {
            0.0
        };

        RiskStats {
            daily_loss: self.daily.loss,
            daily_loss_pct: self.daily.loss_pct,
            daily_trades: self.daily.trades,
            daily_wins: self.daily.wins,
            daily_losses: self.daily.losses,
            daily_win_rate,
            remaining_trades: self
                .settings
                .max_trades_per_day
                .saturating_sub(self.daily.trades),
            max_daily_loss_pct: self.settings.max_daily_loss_pct,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
