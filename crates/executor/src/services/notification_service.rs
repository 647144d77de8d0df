use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::NotificationSettings;
use common::models::TradeSide;
use serde::Serialize;
use teloxide::prelude::*;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub const COLOR_GREEN: u32 = 3_066_993;
pub const COLOR_RED: u32 = 15_158_332;

const ERROR_TEXT_LIMIT: usize = 1000;
const FOOTER: &str = "Micro-Scalp Trading Bot";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook rejected the message with status {0}")]
    Rejected(u16),
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

/// Something worth telling a human about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TradeOpened {
        symbol: String,
        side: TradeSide,
        price: f64,
        quantity: f64,
        confidence: f64,
    },
    TradeClosed {
        symbol: String,
        side: TradeSide,
        entry: f64,
        exit: f64,
        pnl: f64,
        pnl_pct: f64,
    },
    StopLoss {
        symbol: String,
        price: f64,
        loss: f64,
    },
    TakeProfit {
        symbol: String,
        price: f64,
        profit: f64,
    },
    DailySummary {
        total_trades: usize,
        win_rate: f64,
        total_pnl: f64,
        balance: f64,
    },
    Error(String),
    SystemStatus {
        operational: bool,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}

fn field(name: &str, value: String) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value,
        inline: true,
    }
}

fn footer(text: &str) -> Option<EmbedFooter> {
    Some(EmbedFooter {
        text: text.to_string(),
    })
}

impl Notification {
    /// Plain message line shown above the embed.
    pub fn content(&self) -> String {
        match self {
            Self::TradeOpened { symbol, .. } => format!("New trade opened for {symbol}"),
            Self::TradeClosed { symbol, .. } => format!("Trade closed for {symbol}"),
            Self::StopLoss { symbol, .. } => format!("Stop loss triggered for {symbol}"),
            Self::TakeProfit { symbol, .. } => format!("Take profit hit for {symbol}!"),
            Self::DailySummary { .. } => "Daily summary ready!".to_string(),
            Self::Error(_) => "Trading bot encountered an error".to_string(),
            Self::SystemStatus { .. } => "Trading bot status update".to_string(),
        }
    }

    pub fn embed(&self, at: DateTime<Utc>) -> Embed {
        let timestamp = at.to_rfc3339();
        match self {
            Self::TradeOpened {
                symbol,
                side,
                price,
                quantity,
                confidence,
            } => Embed {
                title: format!("Trade Opened: {symbol}"),
                description: format!("{side} position opened at ${price:.2}"),
                color: match side {
                    TradeSide::Buy => COLOR_GREEN,
                    TradeSide::Sell => COLOR_RED,
                },
                timestamp,
                fields: vec![
                    field("Side", side.to_string()),
                    field("Price", format!("${price:.2}")),
                    field("Quantity", format!("{quantity:.6}")),
                    field("Confidence", format!("{:.0}%", confidence * 100.0)),
                ],
                footer: footer(FOOTER),
            },
            Self::TradeClosed {
                symbol,
                side,
                entry,
                exit,
                pnl,
                pnl_pct,
            } => Embed {
                title: format!("Trade Closed: {symbol}"),
                description: format!("{side} position closed"),
                color: if *pnl > 0.0 { COLOR_GREEN } else { COLOR_RED },
                timestamp,
                fields: vec![
                    field("Entry", format!("${entry:.2}")),
                    field("Exit", format!("${exit:.2}")),
                    field("P&L", format!("${pnl:+.2}")),
                    field("P&L %", format!("{pnl_pct:+.2}%")),
                ],
                footer: footer(FOOTER),
            },
            Self::StopLoss {
                symbol,
                price,
                loss,
            } => Embed {
                title: format!("Stop Loss Triggered: {symbol}"),
                description: format!("Position stopped at ${price:.2}"),
                color: COLOR_RED,
                timestamp,
                fields: vec![
                    field("Stop Price", format!("${price:.2}")),
                    field("Loss", format!("${loss:.2}")),
                ],
                footer: footer("Risk Management"),
            },
            Self::TakeProfit {
                symbol,
                price,
                profit,
            } => Embed {
                title: format!("Take Profit: {symbol}"),
                description: format!("Target reached at ${price:.2}"),
                color: COLOR_GREEN,
                timestamp,
                fields: vec![
                    field("Exit Price", format!("${price:.2}")),
                    field("Profit", format!("${profit:.2}")),
                ],
                footer: footer("Profit Target Reached"),
            },
            Self::DailySummary {
                total_trades,
                win_rate,
                total_pnl,
                balance,
            } => Embed {
                title: "Daily Trading Summary".to_string(),
                description: format!("Performance for {}", at.format("%Y-%m-%d")),
                color: if *total_pnl >= 0.0 {
                    COLOR_GREEN
                } else {
                    COLOR_RED
                },
                timestamp,
                fields: vec![
                    field("Total Trades", total_trades.to_string()),
                    field("Win Rate", format!("{win_rate:.1}%")),
                    field("Total P&L", format!("${total_pnl:+.2}")),
                    field("Balance", format!("${balance:.2}")),
                ],
                footer: footer("Micro-Scalp Trading Bot - Daily Report"),
            },
            Self::Error(message) => Embed {
                title: "Trading Bot Error".to_string(),
                description: message.chars().take(ERROR_TEXT_LIMIT).collect(),
                color: COLOR_RED,
                timestamp,
                fields: Vec::new(),
                footer: footer("Check logs for details"),
            },
            Self::SystemStatus {
                operational,
                message,
            } => Embed {
                title: format!(
                    "Bot Status: {}",
                    if *operational {
                        "Operational"
                    } else {
                        "Issue Detected"
                    }
                ),
                description: if message.is_empty() {
                    "Trading bot status update".to_string()
                } else {
                    message.clone()
                },
                color: if *operational { COLOR_GREEN } else { COLOR_RED },
                timestamp,
                fields: Vec::new(),
                footer: None,
            },
        }
    }

    pub fn webhook_payload(&self, at: DateTime<Utc>) -> WebhookPayload {
        WebhookPayload {
            content: self.content(),
            embeds: vec![self.embed(at)],
        }
    }

    /// The embed flattened into lines for chat sinks without rich formatting.
    pub fn plain_text(&self, at: DateTime<Utc>) -> String {
        let embed = self.embed(at);
        let mut lines = vec![embed.title, embed.description];
        lines.extend(
            embed
                .fields
                .into_iter()
                .map(|f| format!("{}: {}", f.name, f.value)),
        );
        lines.join("\n")
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&notification.webhook_payload(Utc::now()))
            .send()
            .await?;

        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(NotifyError::Rejected(status)),
        }
    }
}

pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let text = format!(
            "{}\n\n{}",
            notification.content(),
            notification.plain_text(Utc::now())
        );
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}

/// Fans bot notifications out to every configured sink. A failed delivery is
/// logged and dropped.
pub struct NotificationService {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotificationService {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    /// `None` when no sink is configured.
    pub fn from_settings(
        settings: &NotificationSettings,
        timeout: Duration,
    ) -> Result<Option<Self>, NotifyError> {
        if !settings.any_enabled() {
            info!("No notification sinks configured");
            return Ok(None);
        }

        let mut sinks: Vec<Box<dyn Notifier>> = Vec::new();

        if let Some(url) = &settings.discord_webhook_url {
            sinks.push(Box::new(DiscordNotifier::new(url, timeout)?));
        }
        if let (Some(token), Some(chat_id)) =
            (&settings.telegram_bot_token, settings.telegram_chat_id)
        {
            sinks.push(Box::new(TelegramNotifier::new(token, chat_id)));
        }

        Ok((!sinks.is_empty()).then(|| Self::new(sinks)))
    }

    pub async fn dispatch(&self, notification: &Notification) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(notification).await {
                error!("Failed to send {} notification: {}", sink.name(), e);
            }
        }
    }

    pub async fn start(self, mut rx: broadcast::Receiver<Notification>) {
        info!("Starting notification service ({} sinks)", self.sinks.len());

        loop {
            match rx.recv().await {
                Ok(notification) => self.dispatch(&notification).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Notification service lagged behind. Missed {} messages.", n);
                }
                Err(_) => {
                    info!("Notification channel closed. Stopping service.");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_trade_opened_payload_shape() {
        let n = Notification::TradeOpened {
            symbol: "BTCUSDT".into(),
            side: TradeSide::Buy,
            price: 72_500.5,
            quantity: 0.0015,
            confidence: 0.75,
        };
        let json = serde_json::to_value(n.webhook_payload(at())).unwrap();

        assert_eq!(json["content"], "New trade opened for BTCUSDT");
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "Trade Opened: BTCUSDT");
        assert_eq!(embed["color"], COLOR_GREEN);
        assert_eq!(embed["timestamp"], "2024-05-01T12:00:00+00:00");
        assert_eq!(embed["footer"]["text"], FOOTER);
        assert_eq!(embed["fields"][1]["value"], "$72500.50");
        assert_eq!(embed["fields"][2]["value"], "0.001500");
        assert_eq!(embed["fields"][3]["value"], "75%");
        assert_eq!(embed["fields"][0]["inline"], true);
    }

    #[test]
    fn test_colors_follow_outcome() {
        let closed = |pnl: f64| Notification::TradeClosed {
            symbol: "ETHUSDT".into(),
            side: TradeSide::Buy,
            entry: 100.0,
            exit: 100.0 + pnl,
            pnl,
            pnl_pct: pnl,
        };
        assert_eq!(closed(5.0).embed(at()).color, COLOR_GREEN);
        assert_eq!(closed(-5.0).embed(at()).color, COLOR_RED);
        assert_eq!(closed(-5.0).embed(at()).fields[2].value, "$-5.00");
        assert_eq!(closed(5.0).embed(at()).fields[3].value, "+5.00%");

        let opened_short = Notification::TradeOpened {
            symbol: "X".into(),
            side: TradeSide::Sell,
            price: 1.0,
            quantity: 1.0,
            confidence: 0.6,
        };
        assert_eq!(opened_short.embed(at()).color, COLOR_RED);
        assert_eq!(Notification::Error("boom".into()).embed(at()).color, COLOR_RED);
    }

    #[test]
    fn test_status_embed_omits_empty_sections() {
        let n = Notification::SystemStatus {
            operational: true,
            message: String::new(),
        };
        let json = serde_json::to_value(n.embed(at())).unwrap();
        assert_eq!(json["title"], "Bot Status: Operational");
        assert_eq!(json["description"], "Trading bot status update");
        assert!(json.get("fields").is_none());
        assert!(json.get("footer").is_none());
    }

    #[test]
    fn test_error_text_is_truncated() {
        let n = Notification::Error("x".repeat(5000));
        assert_eq!(n.embed(at()).description.len(), ERROR_TEXT_LIMIT);
    }

    #[test]
    fn test_plain_text_lists_fields() {
        let n = Notification::StopLoss {
            symbol: "SOLUSDT".into(),
            price: 95.5,
            loss: 12.25,
        };
        assert_eq!(
            n.plain_text(at()),
            "Stop Loss Triggered: SOLUSDT\nPosition stopped at $95.50\nStop Price: $95.50\nLoss: $12.25"
        );
    }

    #[test]
    fn test_no_sinks_without_credentials() {
        let settings = NotificationSettings::default();
        assert!(
            NotificationService::from_settings(&settings, Duration::from_secs(1))
                .unwrap()
                .is_none()
        );
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(notification.content());
            if self.fail {
                Err(NotifyError::Rejected(500))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_service_forwards_until_channel_closes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = NotificationService::new(vec![
            Box::new(Recorder {
                seen: seen.clone(),
                fail: true,
            }),
            Box::new(Recorder {
                seen: seen.clone(),
                fail: false,
            }),
        ]);

        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(service.start(rx));
        tx.send(Notification::Error("one".into())).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
