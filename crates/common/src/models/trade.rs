use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(UnknownVariant {
                kind: "trade side",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownVariant {
                kind: "trade status",
                value: other.to_string(),
            }),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub profit_loss: f64,
    pub profit_loss_pct: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub status: TradeStatus,
    pub strategy: String,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Trade {
    pub fn cost_basis(&self) -> f64 {
        self.entry_price * self.quantity
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// P&L before fees if the position were closed at `price`.
    pub fn gross_pnl(&self, price: f64) -> f64 {
        match self.side {
            TradeSide::Buy => (price - self.entry_price) * self.quantity,
            TradeSide::Sell => (self.entry_price - price) * self.quantity,
        }
    }

    /// Unrealised P&L and its percentage of the cost basis.
    pub fn unrealized(&self, price: f64) -> (f64, f64) {
        let pnl = self.gross_pnl(price);
        let basis = self.cost_basis();
        let pct = if basis > 0.0 { pnl / basis * 100.0 } else { 0.0 };
        (pnl, pct)
    }

    /// Which level, if any, `price` has crossed.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        match self.side {
            TradeSide::Buy if price <= self.stop_loss => Some(ExitReason::StopLoss),
            TradeSide::Buy if price >= self.take_profit => Some(ExitReason::TakeProfit),
            TradeSide::Sell if price >= self.stop_loss => Some(ExitReason::StopLoss),
            TradeSide::Sell if price <= self.take_profit => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }

    /// Marks the trade closed and returns the exit fee charged.
    /// Only the exit fee is taken out of the realised P&L.
    pub fn close(&mut self, exit_price: f64, fee_rate: f64, at: DateTime<Utc>) -> f64 {
        let exit_fee = exit_price * self.quantity * fee_rate;
        let basis = self.cost_basis();

        self.exit_price = Some(exit_price);
        self.exit_time = Some(at);
        self.status = TradeStatus::Closed;
        self.profit_loss = self.gross_pnl(exit_price) - exit_fee;
        self.profit_loss_pct = if basis > 0.0 {
            self.profit_loss / basis * 100.0
        } else {
            0.0
        };

        exit_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_trade(side: TradeSide) -> Trade {
        Trade {
            id: 1,
            symbol: "BTCUSDT".to_string(),
            side,
            entry_price: 50_000.0,
            exit_price: None,
            quantity: 0.1,
            profit_loss: 0.0,
            profit_loss_pct: 0.0,
            entry_time: Utc::now(),
            exit_time: None,
            status: TradeStatus::Open,
            strategy: "micro_scalp".to_string(),
            stop_loss: if side == TradeSide::Buy { 49_000.0 } else { 51_000.0 },
            take_profit: if side == TradeSide::Buy { 52_000.0 } else { 48_000.0 },
        }
    }

    #[test]
    fn test_buy_exit_triggers() {
        let trade = open_trade(TradeSide::Buy);
        assert_eq!(trade.exit_trigger(48_999.0), Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_trigger(49_000.0), Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_trigger(52_000.0), Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_trigger(50_500.0), None);
    }

    #[test]
    fn test_sell_exit_triggers() {
        let trade = open_trade(TradeSide::Sell);
        assert_eq!(trade.exit_trigger(51_000.0), Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_trigger(47_500.0), Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_trigger(49_900.0), None);
    }

    #[test]
    fn test_close_buy_takes_exit_fee_only() {
        let mut trade = open_trade(TradeSide::Buy);
        let fee = trade.close(51_500.0, 0.001, Utc::now());

        assert!((fee - 5.15).abs() < 1e-9);
        assert!((trade.profit_loss - 144.85).abs() < 1e-9);
        assert!((trade.profit_loss_pct - 2.897).abs() < 1e-9);
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_price, Some(51_500.0));
    }

    #[test]
    fn test_close_sell_flips_sign() {
        let mut trade = open_trade(TradeSide::Sell);
        trade.close(49_000.0, 0.0, Utc::now());
        assert!((trade.profit_loss - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_side_round_trips_through_str() {
        assert_eq!("SELL".parse::<TradeSide>(), Ok(TradeSide::Sell));
        assert!("LONG".parse::<TradeSide>().is_err());
        assert_eq!("CLOSED".parse::<TradeStatus>(), Ok(TradeStatus::Closed));
    }
}
