use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use common::config::BotConfig;
use common::models::{ExitReason, Signal, SignalKind, TickerStats, Trade, TradeSide};
use market_data::services::PriceMonitor;
use market_data::traits::PriceFeed;
use sqlx::SqlitePool;
use storage::repositories::{PriceHistoryRepository, TradesRepository};
use strategy::services::backtester::{BacktestReport, Backtester};
use strategy::services::risk_manager::RiskManager;
use strategy::services::signal_generator::{MIN_CANDLES, SignalGenerator};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::notification_service::Notification;
use super::paper_trader::{PaperTrader, TradeError};
use super::report::{REPORT_STATUS, SignalSummary, TradingReport, price_alert};

const STATUS_EVERY: u64 = 5;
const BLOCKED_LOG_EVERY: u64 = 10;
const BACKTEST_INTERVAL: &str = "1h";
/// Binance caps a klines request at 1000 rows.
const MAX_KLINES: u32 = 1000;

/// One paper-trading account driven by periodic market checks.
pub struct TradingBot {
    config: BotConfig,
    pool: SqlitePool,
    monitor: PriceMonitor,
    generator: SignalGenerator,
    risk: RiskManager,
    trader: PaperTrader,
    notifier: Option<broadcast::Sender<Notification>>,
    market_summary: BTreeMap<String, TickerStats>,
    latest_signals: BTreeMap<String, Signal>,
    alerts: Vec<String>,
    cycles: u64,
    summary_date: NaiveDate,
}

impl TradingBot {
    pub fn new(config: BotConfig, pool: SqlitePool, feed: Box<dyn PriceFeed>) -> Self {
        let trader = PaperTrader::new(pool.clone(), config.initial_balance, config.fee_rate);
        let risk = RiskManager::new(config.risk.clone());

        Self {
            config,
            pool,
            monitor: PriceMonitor::new(feed),
            generator: SignalGenerator::new(),
            risk,
            trader,
            notifier: None,
            market_summary: BTreeMap::new(),
            latest_signals: BTreeMap::new(),
            alerts: Vec::new(),
            cycles: 0,
            summary_date: Local::now().date_naive(),
        }
    }

    pub fn with_notifier(mut self, tx: broadcast::Sender<Notification>) -> Self {
        self.notifier = Some(tx);
        self
    }

    /// Reloads the paper account and today's risk counters from the ledger.
    pub async fn restore(&mut self) -> Result<(), TradeError> {
        self.trader.restore().await?;

        let today = Local::now().date_naive();
        let since = start_of_local_day(today);
        let opened = TradesRepository::count_entered_since(&self.pool, since).await?;
        let closed_pnls: Vec<f64> = TradesRepository::closed_since(&self.pool, since)
            .await?
            .iter()
            .map(|t| t.profit_loss)
            .collect();

        self.risk.restore_day(
            today,
            u32::try_from(opened).unwrap_or(u32::MAX),
            &closed_pnls,
            self.trader.equity(),
        );
        info!(
            "Restored today's risk counters: {} trades opened, {} closed",
            opened,
            closed_pnls.len()
        );
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        if let Some(tx) = &self.notifier {
            // No subscriber just means nobody is listening.
            let _ = tx.send(notification);
        }
    }

    /// Closes every open trade whose stop or target the current price has
    /// crossed. Prices come from one bulk request; a symbol missing from it
    /// is fetched on its own, and left alone if that fails too.
    pub async fn check_open_trades(&mut self) -> Result<Vec<Trade>, TradeError> {
        let mut closed = Vec::new();
        if self.trader.open_trades().is_empty() {
            return Ok(closed);
        }

        let mut symbols: Vec<String> = self
            .trader
            .open_trades()
            .iter()
            .map(|t| t.symbol.clone())
            .collect();
        symbols.dedup();
        let mut prices: HashMap<String, f64> = self.monitor.prices(&symbols).await;

        for trade in self.trader.open_trades().to_vec() {
            let price = match prices.get(&trade.symbol) {
                Some(price) => *price,
                None => match self.monitor.price(&trade.symbol).await {
                    Some(price) => {
                        prices.insert(trade.symbol.clone(), price);
                        price
                    }
                    None => continue,
                },
            };

            let Some(reason) = trade.exit_trigger(price) else {
                continue;
            };
            match reason {
                ExitReason::StopLoss => info!("STOP LOSS triggered for {}", trade.symbol),
                _ => info!("TAKE PROFIT triggered for {}", trade.symbol),
            }

            let done = self.trader.close_trade(trade.id, price, reason).await?;
            self.risk.record_close(done.profit_loss, self.trader.equity());

            self.notify(match reason {
                ExitReason::StopLoss => Notification::StopLoss {
                    symbol: done.symbol.clone(),
                    price,
                    loss: done.profit_loss,
                },
                _ => Notification::TakeProfit {
                    symbol: done.symbol.clone(),
                    price,
                    profit: done.profit_loss,
                },
            });
            self.notify(Notification::TradeClosed {
                symbol: done.symbol.clone(),
                side: done.side,
                entry: done.entry_price,
                exit: price,
                pnl: done.profit_loss,
                pnl_pct: done.profit_loss_pct,
            });
            closed.push(done);
        }

        Ok(closed)
    }

    /// Scores every symbol without an open trade and enters on strong BUYs.
    pub async fn check_new_signals(&mut self) -> Result<Vec<Trade>, TradeError> {
        if let Err(reason) = self.risk.can_trade() {
            if self.cycles % BLOCKED_LOG_EVERY == 0 {
                warn!("Trading blocked: {}", reason);
            }
            return Ok(Vec::new());
        }

        let mut opened = Vec::new();
        for symbol in self.config.symbols.clone() {
            if self.trader.has_open_trade(&symbol) {
                continue;
            }

            let candles = self
                .monitor
                .klines(&symbol, &self.config.kline_interval, self.config.kline_limit)
                .await;
            if candles.len() < MIN_CANDLES {
                debug!("Skipping {}: only {} candles", symbol, candles.len());
                continue;
            }

            let signal = self.generator.generate(&candles, &symbol);
            self.latest_signals.insert(symbol.clone(), signal.clone());

            if !signal.is_actionable(SignalKind::Buy, self.config.min_confidence) {
                continue;
            }
            let Some(indicators) = &signal.indicators else {
                continue;
            };

            info!(
                "BUY signal for {}: {} (confidence: {:.2})",
                symbol, signal.reason, signal.confidence
            );

            let price = indicators.price;
            let size = self.risk.position_size(
                self.trader.equity(),
                price,
                indicators.atr,
                signal.confidence,
            );
            let stop_loss = self.risk.stop_loss(price, TradeSide::Buy, indicators.atr);
            let take_profit = self.risk.take_profit(price, TradeSide::Buy, stop_loss);

            match self
                .trader
                .open_trade(
                    &symbol,
                    TradeSide::Buy,
                    price,
                    size.quantity,
                    stop_loss,
                    take_profit,
                )
                .await
            {
                Ok(trade) => {
                    self.risk.record_open();
                    let limit_hit = self.risk.can_trade().is_err();
                    self.notify(Notification::TradeOpened {
                        symbol: symbol.clone(),
                        side: trade.side,
                        price,
                        quantity: trade.quantity,
                        confidence: signal.confidence,
                    });
                    opened.push(trade);
                    if limit_hit {
                        info!("Daily trade limit reached, no further entries this cycle");
                        break;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Could not open {} trade: {}", symbol, e),
            }
        }

        Ok(opened)
    }

    /// Refreshes 24h tickers, records their prices and raises move alerts.
    pub async fn collect_market_summary(&mut self) -> Result<(), sqlx::Error> {
        self.alerts.clear();
        let now = Utc::now();

        for symbol in self.config.symbols.clone() {
            let Some(ticker) = self.monitor.ticker(&symbol).await else {
                continue;
            };
            PriceHistoryRepository::insert(&self.pool, &symbol, ticker.price, now).await?;

            if let Some(alert) = price_alert(&ticker, self.config.alert_threshold_pct) {
                warn!("ALERT: {}", alert);
                self.alerts.push(alert);
            }
            self.market_summary.insert(symbol, ticker);
        }
        Ok(())
    }

    pub fn build_report(&mut self) -> TradingReport {
        TradingReport {
            timestamp: Utc::now(),
            status: REPORT_STATUS,
            market_summary: self.market_summary.clone(),
            trading_stats: self.trader.stats(),
            risk_stats: self.risk.stats(),
            signal_stats: self.generator.stats(),
            monitor_stats: self.monitor.stats(),
            signals: self
                .latest_signals
                .iter()
                .map(|(symbol, signal)| (symbol.clone(), SignalSummary::from(signal)))
                .collect(),
            alerts: self.alerts.clone(),
        }
    }

    pub async fn log_status(&mut self) {
        let stats = self.trader.stats();
        let risk = self.risk.stats();

        info!(
            "Balance: ${:.2} | Equity: ${:.2} (peak ${:.2}) | Return: {:+.2}% | Win rate: {:.1}% | Trades: {} | Open: {} | Max DD: {:.2}% | Daily loss: {:.2}%",
            stats.balance,
            stats.equity,
            self.trader.peak_equity(),
            stats.total_return_pct,
            stats.win_rate,
            stats.total_trades,
            stats.open_trades,
            stats.max_drawdown_pct,
            risk.daily_loss_pct,
        );

        for trade in self.trader.open_trades().to_vec() {
            let price = match self.monitor.cached_price(&trade.symbol) {
                Some(price) => Some(price),
                None => self.monitor.price(&trade.symbol).await,
            };
            if let Some(price) = price {
                let (pnl, pct) = trade.unrealized(price);
                info!(
                    "  {}: ${:.2} -> ${:.2} | P&L: ${:.2} ({:+.2}%)",
                    trade.symbol, trade.entry_price, price, pnl, pct
                );
            }
        }
    }

    fn maybe_send_daily_summary(&mut self, today: NaiveDate) {
        if today == self.summary_date {
            return;
        }
        self.summary_date = today;

        let stats = self.trader.stats();
        self.notify(Notification::DailySummary {
            total_trades: stats.total_trades,
            win_rate: stats.win_rate,
            total_pnl: stats.total_pnl,
            balance: stats.balance,
        });
    }

    /// Exits, entries, market summary, report. Only ledger failures abort.
    pub async fn run_cycle(&mut self) -> anyhow::Result<()> {
        self.cycles += 1;
        debug!("Cycle {} starting", self.cycles);

        self.check_open_trades().await?;
        self.check_new_signals().await?;
        self.collect_market_summary().await?;

        let report = self.build_report();
        if let Err(e) = report.write(&self.config.report_path).await {
            warn!("Failed to write report: {}", e);
        }

        self.maybe_send_daily_summary(Local::now().date_naive());
        Ok(())
    }

    /// A single cycle for callers that schedule the bot externally.
    pub async fn run_once(&mut self) -> anyhow::Result<()> {
        self.run_cycle().await?;
        self.log_status().await;
        Ok(())
    }

    /// Cycles until Ctrl-C or a ledger failure.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Starting micro-scalp bot (PAPER TRADING MODE)");
        info!("Symbols: {:?}", self.config.symbols);
        info!(
            "Balance: ${:.2} (initial ${:.2})",
            self.trader.balance(),
            self.trader.initial_balance()
        );
        info!("Check interval: {:?}", self.config.check_interval);

        self.notify(Notification::SystemStatus {
            operational: true,
            message: "Bot started".to_string(),
        });

        let result = loop {
            if let Err(e) = self.run_cycle().await {
                break Err(e);
            }
            if self.cycles % STATUS_EVERY == 0 {
                self.log_status().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Bot stopped by user");
                    break Ok(());
                }
            }
        };

        if let Err(e) = &result {
            error!("Bot error: {:#}", e);
            self.notify(Notification::Error(format!("{e:#}")));
        }

        info!("Final statistics");
        self.log_status().await;
        self.notify(Notification::SystemStatus {
            operational: result.is_ok(),
            message: "Bot stopped".to_string(),
        });
        result
    }

    /// Replays hourly candles for the configured symbol and backtest window.
    pub async fn run_backtest(&mut self) -> Option<BacktestReport> {
        let symbol = self.config.backtest_symbol.clone();
        let limit = self.config.backtest_days.saturating_mul(24).min(MAX_KLINES);
        info!(
            "Running backtest for {} (last {} days)",
            symbol, self.config.backtest_days
        );

        let candles = self.monitor.klines(&symbol, BACKTEST_INTERVAL, limit).await;
        if candles.len() <= MIN_CANDLES {
            warn!(
                "Insufficient data for backtest. Got {} candles.",
                candles.len()
            );
            return None;
        }

        let report = Backtester::new(SignalGenerator::new()).run(
            &candles,
            &symbol,
            self.config.initial_balance,
        );
        report.log_summary();
        Some(report)
    }
}

/// Local midnight of `date` as a UTC instant; falls back to UTC midnight
/// when the local clock skips that hour.
fn start_of_local_day(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
