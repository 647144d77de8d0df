use chrono::Utc;
use common::models::{ExitReason, PerformanceSnapshot, Trade, TradeSide, TradeStatus};
use serde::{Serialize, Serializer};
use sqlx::SqlitePool;
use storage::repositories::{PerformanceRepository, TradesRepository};
use strategy::services::backtester::max_drawdown_pct;
use thiserror::Error;
use tracing::{info, warn};

pub const STRATEGY_NAME: &str = "micro_scalp";

/// Share of the balance a single entry may consume, fees included.
const MAX_BALANCE_USE: f64 = 0.95;
const TRADING_DAYS: f64 = 252.0;

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },
    #[error("{0} already has an open trade")]
    AlreadyOpen(String),
    #[error("Invalid quantity {0}")]
    InvalidQuantity(f64),
    #[error("Trade #{0} is not open")]
    NotFound(i64),
    #[error("Ledger error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TradeError {
    /// Only ledger failures should stop the bot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

fn infinite_as_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraderStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_profit: f64,
    pub avg_loss: f64,
    /// Infinite when nothing has lost yet.
    #[serde(serialize_with = "infinite_as_null")]
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub balance: f64,
    pub equity: f64,
    pub total_return_pct: f64,
    pub open_trades: usize,
    pub total_fees: f64,
}

/// Simulated account: an in-process balance mirrored into the SQLite ledger.
pub struct PaperTrader {
    pool: SqlitePool,
    initial_balance: f64,
    fee_rate: f64,
    balance: f64,
    peak_equity: f64,
    total_fees: f64,
    open: Vec<Trade>,
    closed: Vec<Trade>,
}

impl PaperTrader {
    pub fn new(pool: SqlitePool, initial_balance: f64, fee_rate: f64) -> Self {
        Self {
            pool,
            initial_balance,
            fee_rate,
            balance: initial_balance,
            peak_equity: initial_balance,
            total_fees: 0.0,
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    /// Picks the account up where the ledger left it: open positions, the
    /// closed history and the last recorded balance.
    pub async fn restore(&mut self) -> Result<(), TradeError> {
        let Some(snapshot) = PerformanceRepository::latest(&self.pool).await? else {
            return Ok(());
        };

        self.open = TradesRepository::open_trades(&self.pool).await?;
        self.closed = TradesRepository::closed_trades(&self.pool).await?;
        self.balance = snapshot.balance;

        let entry_fees: f64 = self
            .open
            .iter()
            .chain(&self.closed)
            .map(|t| t.cost_basis() * self.fee_rate)
            .sum();
        let exit_fees: f64 = self
            .closed
            .iter()
            .filter_map(|t| t.exit_price.map(|exit| exit * t.quantity * self.fee_rate))
            .sum();
        self.total_fees = entry_fees + exit_fees;
        self.peak_equity = self.equity_path().into_iter().fold(self.equity(), f64::max);

        info!(
            balance = format!("{:.2}", self.balance),
            open = self.open.len(),
            closed = self.closed.len(),
            "Restored paper account"
        );
        Ok(())
    }

    pub async fn open_trade(
        &mut self,
        symbol: &str,
        side: TradeSide,
        price: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<Trade, TradeError> {
        if quantity.is_nan() || quantity <= 0.0 {
            return Err(TradeError::InvalidQuantity(quantity));
        }

        let cost = price * quantity;
        let fee = cost * self.fee_rate;
        let required = cost + fee;
        if required > self.balance * MAX_BALANCE_USE {
            warn!(
                "Insufficient balance for trade. Required: ${:.2}, Available: ${:.2}",
                required, self.balance
            );
            return Err(TradeError::InsufficientBalance {
                required,
                available: self.balance,
            });
        }

        if self.open.iter().any(|t| t.symbol == symbol)
            || TradesRepository::has_open_trade(&self.pool, symbol).await?
        {
            return Err(TradeError::AlreadyOpen(symbol.to_string()));
        }

        let mut trade = Trade {
            id: 0,
            symbol: symbol.to_string(),
            side,
            entry_price: price,
            exit_price: None,
            quantity,
            profit_loss: 0.0,
            profit_loss_pct: 0.0,
            entry_time: Utc::now(),
            exit_time: None,
            status: TradeStatus::Open,
            strategy: STRATEGY_NAME.to_string(),
            stop_loss,
            take_profit,
        };
        trade.id = TradesRepository::insert(&self.pool, &trade).await?;

        self.balance -= required;
        self.total_fees += fee;
        self.open.push(trade.clone());
        self.record_performance().await?;

        info!(
            "OPENED {} trade #{}: {} @ ${:.2} x {} (SL: ${:.2}, TP: ${:.2})",
            side, trade.id, symbol, price, quantity, stop_loss, take_profit
        );
        Ok(trade)
    }

    pub async fn close_trade(
        &mut self,
        trade_id: i64,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<Trade, TradeError> {
        let idx = self
            .open
            .iter()
            .position(|t| t.id == trade_id)
            .ok_or(TradeError::NotFound(trade_id))?;

        let mut trade = self.open[idx].clone();
        let gross = trade.gross_pnl(exit_price);
        let exit_fee = trade.close(exit_price, self.fee_rate, Utc::now());

        if !TradesRepository::close(&self.pool, &trade).await? {
            return Err(TradeError::NotFound(trade_id));
        }

        self.open.remove(idx);
        self.balance += trade.cost_basis() + gross;
        self.total_fees += exit_fee;
        self.peak_equity = self.peak_equity.max(self.equity());
        self.closed.push(trade.clone());
        self.record_performance().await?;

        info!(
            "CLOSED trade #{}: P&L = ${:.2} ({:.2}%) [{}]",
            trade.id, trade.profit_loss, trade.profit_loss_pct, reason
        );
        Ok(trade)
    }

    async fn record_performance(&self) -> Result<(), sqlx::Error> {
        let snapshot = PerformanceSnapshot {
            timestamp: Utc::now(),
            balance: self.balance,
            equity: self.equity(),
            open_trades: self.open.len() as i64,
            total_trades: self.closed.len() as i64,
        };
        PerformanceRepository::record(&self.pool, &snapshot).await
    }

    /// Balance plus open positions valued at their entry cost.
    pub fn equity(&self) -> f64 {
        self.balance + self.open.iter().map(Trade::cost_basis).sum::<f64>()
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn open_trades(&self) -> &[Trade] {
        &self.open
    }

    pub fn has_open_trade(&self, symbol: &str) -> bool {
        self.open.iter().any(|t| t.symbol == symbol)
    }

    fn equity_path(&self) -> Vec<f64> {
        let mut running = self.initial_balance;
        let mut path = vec![running];
        for trade in &self.closed {
            running += trade.profit_loss;
            path.push(running);
        }
        path
    }

    pub fn stats(&self) -> TraderStats {
        let equity = self.equity();
        let mut stats = TraderStats {
            total_trades: self.closed.len(),
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            avg_profit: 0.0,
            avg_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            balance: self.balance,
            equity,
            total_return_pct: 0.0,
            open_trades: self.open.len(),
            total_fees: self.total_fees,
        };
        if self.closed.is_empty() {
            return stats;
        }

        let (winners, losers): (Vec<&Trade>, Vec<&Trade>) =
            self.closed.iter().partition(|t| t.profit_loss > 0.0);
        let total_wins: f64 = winners.iter().map(|t| t.profit_loss).sum();
        let total_losses: f64 = losers.iter().map(|t| t.profit_loss).sum();

        stats.winning_trades = winners.len();
        stats.losing_trades = losers.len();
        stats.win_rate = winners.len() as f64 / self.closed.len() as f64 * 100.0;
        stats.total_pnl = total_wins + total_losses;
        if !winners.is_empty() {
            stats.avg_profit = total_wins / winners.len() as f64;
        }
        if !losers.is_empty() {
            stats.avg_loss = total_losses / losers.len() as f64;
        }
        stats.profit_factor = if total_losses != 0.0 {
            total_wins / total_losses.abs()
        } else {
            f64::INFINITY
        };
        stats.max_drawdown_pct = max_drawdown_pct(&self.equity_path());
        stats.sharpe_ratio = sharpe_ratio(
            &self
                .closed
                .iter()
                .map(|t| t.profit_loss_pct)
                .collect::<Vec<_>>(),
        );
        stats.total_return_pct = (equity - self.initial_balance) / self.initial_balance * 100.0;
        stats
    }
}

/// Per-trade returns annualised over 252 trading days, population sigma.
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let sigma = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if sigma > 0.0 {
        mean / sigma * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::db::connect_in_memory;

    const EPS: f64 = 1e-9;

    async fn trader() -> PaperTrader {
        let pool = connect_in_memory().await.unwrap();
        PaperTrader::new(pool, 10_000.0, 0.001)
    }

    #[tokio::test]
    async fn test_open_deducts_cost_and_entry_fee() {
        let mut trader = trader().await;
        let trade = trader
            .open_trade("BTCUSDT", TradeSide::Buy, 50_000.0, 0.1, 49_000.0, 52_000.0)
            .await
            .unwrap();

        assert_eq!(trade.id, 1);
        assert!((trader.balance() - 4_995.0).abs() < EPS);
        assert!((trader.equity() - 9_995.0).abs() < EPS);
        assert!((trader.stats().total_fees - 5.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_close_credits_exit_value_and_charges_exit_fee() {
        let mut trader = trader().await;
        let trade = trader
            .open_trade("BTCUSDT", TradeSide::Buy, 50_000.0, 0.1, 49_000.0, 52_000.0)
            .await
            .unwrap();
        let closed = trader
            .close_trade(trade.id, 51_500.0, ExitReason::Manual)
            .await
            .unwrap();

        assert!((trader.balance() - 10_145.0).abs() < EPS);
        assert!((closed.profit_loss - 144.85).abs() < 1e-6);
        assert!((closed.profit_loss_pct - 2.897).abs() < 1e-6);
        assert_eq!(closed.status, TradeStatus::Closed);
        assert!(trader.open_trades().is_empty());

        let stats = trader.stats();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.win_rate, 100.0);
        assert!(stats.profit_factor.is_infinite());
        assert!((stats.total_fees - 10.15).abs() < 1e-6);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["profit_factor"].is_null());
    }

    #[tokio::test]
    async fn test_sell_close_credits_basis_plus_gross() {
        let mut trader = trader().await;
        let trade = trader
            .open_trade("ETHUSDT", TradeSide::Sell, 2_000.0, 1.0, 2_100.0, 1_800.0)
            .await
            .unwrap();
        trader
            .close_trade(trade.id, 1_900.0, ExitReason::Manual)
            .await
            .unwrap();

        // 10000 - 2002 + 2000 + 100
        assert!((trader.balance() - 10_098.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_duplicate_entries() {
        let mut trader = trader().await;

        let err = trader
            .open_trade("BTCUSDT", TradeSide::Buy, 50_000.0, 0.19, 0.0, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { .. }));
        assert!(!err.is_fatal());
        assert_eq!(trader.balance(), 10_000.0);

        trader
            .open_trade("BTCUSDT", TradeSide::Buy, 100.0, 1.0, 99.0, 102.0)
            .await
            .unwrap();
        let err = trader
            .open_trade("BTCUSDT", TradeSide::Buy, 100.0, 1.0, 99.0, 102.0)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::AlreadyOpen(_)));
        assert_eq!(trader.open_trades().len(), 1);
    }

    #[tokio::test]
    async fn test_closing_unknown_trade_fails() {
        let mut trader = trader().await;
        let err = trader
            .close_trade(42, 100.0, ExitReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_stats_track_losses_and_drawdown() {
        let mut trader = trader().await;
        for (symbol, exit) in [("A", 110.0), ("B", 90.0), ("C", 95.0)] {
            let t = trader
                .open_trade(symbol, TradeSide::Buy, 100.0, 10.0, 0.0, 1e9)
                .await
                .unwrap();
            trader.close_trade(t.id, exit, ExitReason::Manual).await.unwrap();
        }

        let stats = trader.stats();
        assert_eq!((stats.winning_trades, stats.losing_trades), (1, 2));
        assert!((stats.total_pnl - (98.9 - 100.9 - 50.95)).abs() < 1e-6);
        assert!((stats.profit_factor - 98.9 / 151.85).abs() < 1e-9);
        assert!(stats.max_drawdown_pct > 0.0);
        assert!(stats.sharpe_ratio < 0.0);
    }

    #[tokio::test]
    async fn test_restore_continues_the_ledger() {
        let pool = connect_in_memory().await.unwrap();

        let mut first = PaperTrader::new(pool.clone(), 10_000.0, 0.001);
        let kept = first
            .open_trade("BTCUSDT", TradeSide::Buy, 100.0, 10.0, 90.0, 120.0)
            .await
            .unwrap();
        let done = first
            .open_trade("ETHUSDT", TradeSide::Buy, 50.0, 10.0, 45.0, 60.0)
            .await
            .unwrap();
        first.close_trade(done.id, 55.0, ExitReason::TakeProfit).await.unwrap();

        let mut second = PaperTrader::new(pool, 10_000.0, 0.001);
        second.restore().await.unwrap();

        assert!((second.balance() - first.balance()).abs() < EPS);
        assert_eq!(second.open_trades()[0].id, kept.id);
        assert_eq!(second.stats().total_trades, 1);
        assert!((second.stats().total_fees - first.stats().total_fees).abs() < 1e-9);
        assert!(second.has_open_trade("BTCUSDT"));
    }
}
