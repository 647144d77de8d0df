use std::env;

use chrono::Utc;
use dotenvy::dotenv;
use tokio::sync::broadcast;
use tracing::{debug, info};

use common::config::{BotConfig, RunMode};
use common::logger;
use market_data::remote::BinanceRestClient;
use storage::db;

use crate::services::notification_service::{Notification, NotificationService};
use crate::services::performance_review::PerformanceReview;
use crate::services::trading_bot::TradingBot;

mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let mut config = BotConfig::from_env()?;
    // A positional argument overrides BOT_MODE.
    if let Some(mode) = env::args().nth(1) {
        config.mode = mode.parse::<RunMode>().map_err(anyhow::Error::msg)?;
    }

    logger::setup_logger(&config.log_level);
    debug!("System starting up in {:?} mode...", config.mode);

    let pool = db::connect(&config.database_path).await?;

    if config.mode == RunMode::Review {
        PerformanceReview::run(&pool, config.review_hours, Utc::now())
            .await?
            .log();
        return Ok(());
    }

    let feed = BinanceRestClient::new(&config.binance_base_url, config.request_timeout)?;
    let mut bot = TradingBot::new(config.clone(), pool, Box::new(feed));

    if config.mode == RunMode::Backtest {
        bot.run_backtest().await;
        return Ok(());
    }

    bot.restore().await?;

    let mut notifier_handle = None;
    if let Some(service) =
        NotificationService::from_settings(&config.notifications, config.request_timeout)?
    {
        let (notify_tx, notify_rx) = broadcast::channel::<Notification>(256);
        notifier_handle = Some(tokio::spawn(service.start(notify_rx)));
        bot = bot.with_notifier(notify_tx);
    }

    let result = match config.mode {
        RunMode::Once => bot.run_once().await,
        _ => bot.run().await,
    };

    // Closing the channel lets the notifier drain and stop.
    drop(bot);
    if let Some(handle) = notifier_handle {
        handle.await?;
    }

    info!("Shutdown complete");
    result
}
