use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use common::models::{Signal, SignalKind, TickerStats};
use market_data::services::MonitorStats;
use serde::Serialize;
use strategy::services::risk_manager::RiskStats;
use strategy::services::signal_generator::SignalStats;
use tracing::debug;

use super::paper_trader::TraderStats;

pub const REPORT_STATUS: &str = "PAPER_TRADING_ACTIVE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSummary {
    pub signal: SignalKind,
    pub confidence: f64,
    pub reason: String,
    pub price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Signal> for SignalSummary {
    fn from(signal: &Signal) -> Self {
        Self {
            signal: signal.signal,
            confidence: signal.confidence,
            reason: signal.reason.clone(),
            price: signal.indicators.as_ref().map(|i| i.price),
            timestamp: signal.timestamp,
        }
    }
}

/// Snapshot of the bot written after every cycle. The file is replaced as a
/// whole each time.
#[derive(Debug, Clone, Serialize)]
pub struct TradingReport {
    pub timestamp: DateTime<Utc>,
    pub status: &'static str,
    pub market_summary: BTreeMap<String, TickerStats>,
    pub trading_stats: TraderStats,
    pub risk_stats: RiskStats,
    pub signal_stats: Option<SignalStats>,
    pub monitor_stats: MonitorStats,
    pub signals: BTreeMap<String, SignalSummary>,
    pub alerts: Vec<String>,
}

impl TradingReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub async fn write(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::write(path, self.to_json()?).await?;
        debug!("Updated report: {}", path.display());
        Ok(())
    }
}

/// Alert line for a 24h move beyond `threshold_pct` in either direction.
pub fn price_alert(ticker: &TickerStats, threshold_pct: f64) -> Option<String> {
    ticker.is_significant_move(threshold_pct).then(|| {
        format!(
            "{}: Significant move ({:+.2}%)",
            ticker.symbol.trim_end_matches("USDT"),
            ticker.change_24h_pct
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, change: f64) -> TickerStats {
        TickerStats {
            symbol: symbol.to_string(),
            price: 100.0,
            change_24h_pct: change,
            high_24h: 110.0,
            low_24h: 90.0,
            volume: 1_000.0,
        }
    }

    fn report() -> TradingReport {
        let mut market_summary = BTreeMap::new();
        market_summary.insert("BTCUSDT".to_string(), ticker("BTCUSDT", 6.2));

        let mut signals = BTreeMap::new();
        signals.insert(
            "BTCUSDT".to_string(),
            SignalSummary::from(&Signal::hold("BTCUSDT", "No clear signal - mixed indicators")),
        );

        TradingReport {
            timestamp: Utc::now(),
            status: REPORT_STATUS,
            market_summary,
            trading_stats: TraderStats {
                total_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
                win_rate: 0.0,
                total_pnl: 0.0,
                avg_profit: 0.0,
                avg_loss: 0.0,
                profit_factor: f64::INFINITY,
                max_drawdown_pct: 0.0,
                sharpe_ratio: 0.0,
                balance: 10_000.0,
                equity: 10_000.0,
                total_return_pct: 0.0,
                open_trades: 0,
                total_fees: 0.0,
            },
            risk_stats: RiskStats {
                daily_loss: 0.0,
                daily_loss_pct: 0.0,
                daily_trades: 0,
                daily_wins: 0,
                daily_losses: 0,
                daily_win_rate: 0.0,
                remaining_trades: 10,
                max_daily_loss_pct: 3.0,
            },
            signal_stats: None,
            monitor_stats: MonitorStats {
                requests: 3,
                errors: 0,
                error_rate: 0.0,
            },
            signals,
            alerts: vec!["BTC: Significant move (+6.20%)".to_string()],
        }
    }

    #[test]
    fn test_alert_only_beyond_threshold() {
        assert_eq!(
            price_alert(&ticker("ETHUSDT", -7.5), 5.0).as_deref(),
            Some("ETH: Significant move (-7.50%)")
        );
        assert!(price_alert(&ticker("ETHUSDT", 5.0), 5.0).is_none());
        assert!(price_alert(&ticker("ETHUSDT", -4.9), 5.0).is_none());
    }

    #[test]
    fn test_report_json_layout() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();

        assert_eq!(json["status"], "PAPER_TRADING_ACTIVE");
        assert_eq!(json["market_summary"]["BTCUSDT"]["change_24h_pct"], 6.2);
        assert_eq!(json["signals"]["BTCUSDT"]["signal"], "HOLD");
        assert!(json["signals"]["BTCUSDT"]["price"].is_null());
        assert!(json["trading_stats"]["profit_factor"].is_null());
        assert_eq!(json["risk_stats"]["remaining_trades"], 10);
        assert_eq!(json["alerts"][0], "BTC: Significant move (+6.20%)");
        assert!(json["signal_stats"].is_null());
    }

    #[tokio::test]
    async fn test_write_replaces_file() {
        let path = std::env::temp_dir().join(format!("report-{}.json", std::process::id()));
        tokio::fs::write(&path, "stale").await.unwrap();

        report().write(&path).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with('{'));
        assert!(written.contains("\"status\": \"PAPER_TRADING_ACTIVE\""));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
