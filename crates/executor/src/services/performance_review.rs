use chrono::{DateTime, Duration, Utc};
use common::models::Trade;
use serde::Serialize;
use sqlx::SqlitePool;
use storage::repositories::TradesRepository;
use tracing::{info, warn};

const RECENT_TRADES: i64 = 10;
const MIN_TRADES_FOR_WIN_RATE: usize = 3;
const MIN_WIN_RATE: f64 = 50.0;
const MAX_CONSECUTIVE_LOSSES: usize = 3;
const MIN_TOTAL_PNL: f64 = -50.0;

/// How the strategy did over the last few hours, and whether it needs tuning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReview {
    pub window_hours: i64,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl_pct: f64,
    pub consecutive_losses: usize,
    pub needs_optimization: bool,
    pub reasons: Vec<String>,
}

impl PerformanceReview {
    pub async fn run(
        pool: &SqlitePool,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let window =
            TradesRepository::closed_since(pool, now - Duration::hours(window_hours)).await?;
        let recent = TradesRepository::recent_closed(pool, RECENT_TRADES).await?;
        Ok(Self::from_trades(&window, &recent, window_hours))
    }

    /// `recent` is the latest closed trades, newest first.
    pub fn from_trades(window: &[Trade], recent: &[Trade], window_hours: i64) -> Self {
        let total_trades = window.len();
        let wins = window.iter().filter(|t| t.profit_loss > 0.0).count();
        let losses = total_trades - wins;
        let total_pnl: f64 = window.iter().map(|t| t.profit_loss).sum();

        let (win_rate, avg_pnl_pct) = if total_trades > 0 {
            (
                wins as f64 / total_trades as f64 * 100.0,
                window.iter().map(|t| t.profit_loss_pct).sum::<f64>() / total_trades as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let consecutive_losses = recent
            .iter()
            .take_while(|t| t.profit_loss <= 0.0)
            .count();

        let mut reasons = Vec::new();
        if total_trades >= MIN_TRADES_FOR_WIN_RATE && win_rate < MIN_WIN_RATE {
            reasons.push(format!("Win rate {win_rate:.1}% < 50%"));
        }
        if consecutive_losses >= MAX_CONSECUTIVE_LOSSES {
            reasons.push(format!("{consecutive_losses} consecutive losses"));
        }
        if total_pnl < MIN_TOTAL_PNL {
            reasons.push(format!("P&L ${total_pnl:.2} < -$50"));
        }

        Self {
            window_hours,
            total_trades,
            wins,
            losses,
            win_rate,
            total_pnl,
            avg_pnl_pct,
            consecutive_losses,
            needs_optimization: !reasons.is_empty(),
            reasons,
        }
    }

    pub fn log(&self) {
        info!(
            hours = self.window_hours,
            trades = self.total_trades,
            wins = self.wins,
            losses = self.losses,
            win_rate = format!("{:.1}%", self.win_rate),
            total_pnl = format!("${:.2}", self.total_pnl),
            avg_pnl_pct = format!("{:.2}%", self.avg_pnl_pct),
            consecutive_losses = self.consecutive_losses,
            "Performance review"
        );

        if self.needs_optimization {
            for reason in &self.reasons {
                warn!("Optimization required: {}", reason);
            }
        } else {
            info!("No optimization needed, all metrics within thresholds");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{ExitReason, TradeSide};
    use storage::db::connect_in_memory;

    use crate::services::paper_trader::PaperTrader;

    fn closed(pnl: f64, pct: f64) -> Trade {
        Trade {
            id: 1,
            symbol: "BTCUSDT".into(),
            side: TradeSide::Buy,
            entry_price: 100.0,
            exit_price: Some(100.0),
            quantity: 1.0,
            profit_loss: pnl,
            profit_loss_pct: pct,
            entry_time: Utc::now(),
            exit_time: Some(Utc::now()),
            status: common::models::TradeStatus::Closed,
            strategy: "micro_scalp".into(),
            stop_loss: 0.0,
            take_profit: 0.0,
        }
    }

    #[test]
    fn test_healthy_window_needs_nothing() {
        let window = vec![closed(5.0, 1.0), closed(-2.0, -0.4), closed(3.0, 0.6)];
        let recent: Vec<Trade> = window.iter().rev().cloned().collect();
        let review = PerformanceReview::from_trades(&window, &recent, 6);

        assert_eq!((review.wins, review.losses), (2, 1));
        assert!((review.avg_pnl_pct - 0.4).abs() < 1e-9);
        assert_eq!(review.consecutive_losses, 0);
        assert!(!review.needs_optimization);
    }

    #[test]
    fn test_losing_streak_and_low_win_rate_are_flagged() {
        let window = vec![
            closed(4.0, 1.0),
            closed(-1.0, -0.1),
            closed(-1.0, -0.1),
            closed(0.0, 0.0),
        ];
        let recent: Vec<Trade> = window.iter().rev().cloned().collect();
        let review = PerformanceReview::from_trades(&window, &recent, 6);

        assert_eq!(review.win_rate, 25.0);
        assert_eq!(review.consecutive_losses, 3);
        assert!(review.needs_optimization);
        assert_eq!(review.reasons.len(), 2);
    }

    #[test]
    fn test_large_loss_is_flagged_even_with_few_trades() {
        let review = PerformanceReview::from_trades(&[closed(-60.0, -6.0)], &[], 6);
        assert_eq!(review.reasons, vec!["P&L $-60.00 < -$50".to_string()]);
    }

    #[test]
    fn test_empty_window() {
        let review = PerformanceReview::from_trades(&[], &[], 6);
        assert_eq!(review.total_trades, 0);
        assert_eq!(review.win_rate, 0.0);
        assert!(!review.needs_optimization);
    }

    #[tokio::test]
    async fn test_review_reads_recent_closes_from_ledger() {
        let pool = connect_in_memory().await.unwrap();
        let mut trader = PaperTrader::new(pool.clone(), 10_000.0, 0.001);
        for symbol in ["A", "B", "C"] {
            let t = trader
                .open_trade(symbol, TradeSide::Buy, 100.0, 1.0, 90.0, 120.0)
                .await
                .unwrap();
            trader.close_trade(t.id, 95.0, ExitReason::StopLoss).await.unwrap();
        }

        let review = PerformanceReview::run(&pool, 6, Utc::now()).await.unwrap();
        assert_eq!(review.total_trades, 3);
        assert_eq!(review.consecutive_losses, 3);
        assert!(review.needs_optimization);

        let later = Utc::now() + Duration::hours(7);
        let review = PerformanceReview::run(&pool, 6, later).await.unwrap();
        assert_eq!(review.total_trades, 0);
    }
}
