use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT", "ADAUSDT", "DOTUSDT"];

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Cycle forever with a sleep between cycles.
    Loop,
    /// A single cycle, for an external scheduler.
    Once,
    Backtest,
    Review,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loop" => Ok(Self::Loop),
            "once" => Ok(Self::Once),
            "backtest" => Ok(Self::Backtest),
            "review" => Ok(Self::Review),
            other => Err(format!("expected loop|once|backtest|review, got {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskSettings {
    pub max_daily_loss_pct: f64,
    pub max_position_pct: f64,
    pub max_trades_per_day: u32,
    pub atr_multiplier_sl: f64,
    pub risk_reward_ratio: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 3.0,
            max_position_pct: 5.0,
            max_trades_per_day: 10,
            atr_multiplier_sl: 2.0,
            risk_reward_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSettings {
    pub discord_webhook_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

impl NotificationSettings {
    pub fn any_enabled(&self) -> bool {
        self.discord_webhook_url.is_some()
            || (self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub initial_balance: f64,
    pub fee_rate: f64,
    pub min_confidence: f64,
    pub check_interval: Duration,
    pub kline_interval: String,
    pub kline_limit: u32,
    pub database_path: PathBuf,
    pub report_path: PathBuf,
    pub binance_base_url: String,
    pub request_timeout: Duration,
    pub alert_threshold_pct: f64,
    pub risk: RiskSettings,
    pub notifications: NotificationSettings,
    pub mode: RunMode,
    pub backtest_symbol: String,
    pub backtest_days: u32,
    pub review_hours: i64,
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            initial_balance: 10_000.0,
            fee_rate: 0.001,
            min_confidence: 0.6,
            check_interval: Duration::from_secs(60),
            kline_interval: "5m".to_string(),
            kline_limit: 100,
            database_path: PathBuf::from("paper_trades.db"),
            report_path: PathBuf::from("daily_trading_report.json"),
            binance_base_url: "https://api.binance.com".to_string(),
            request_timeout: Duration::from_secs(10),
            alert_threshold_pct: 5.0,
            risk: RiskSettings::default(),
            notifications: NotificationSettings::default(),
            mode: RunMode::Loop,
            backtest_symbol: "BTCUSDT".to_string(),
            backtest_days: 30,
            review_hours: 6,
            log_level: "info".to_string(),
        }
    }
}

impl BotConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first if a
    /// `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("TRADING_SYMBOLS") {
            let symbols: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if symbols.is_empty() {
                return Err(ConfigError::Empty("TRADING_SYMBOLS"));
            }
            config.symbols = symbols;
        }

        parse_into(&get, "INITIAL_BALANCE", &mut config.initial_balance)?;
        parse_into(&get, "FEE_RATE", &mut config.fee_rate)?;
        parse_into(&get, "MIN_CONFIDENCE", &mut config.min_confidence)?;
        parse_into(&get, "KLINE_LIMIT", &mut config.kline_limit)?;
        parse_into(&get, "ALERT_THRESHOLD_PCT", &mut config.alert_threshold_pct)?;
        parse_into(&get, "MAX_DAILY_LOSS_PCT", &mut config.risk.max_daily_loss_pct)?;
        parse_into(&get, "MAX_POSITION_PCT", &mut config.risk.max_position_pct)?;
        parse_into(&get, "MAX_TRADES_PER_DAY", &mut config.risk.max_trades_per_day)?;
        parse_into(&get, "ATR_MULTIPLIER_SL", &mut config.risk.atr_multiplier_sl)?;
        parse_into(&get, "RISK_REWARD_RATIO", &mut config.risk.risk_reward_ratio)?;
        parse_into(&get, "BACKTEST_DAYS", &mut config.backtest_days)?;
        parse_into(&get, "REVIEW_HOURS", &mut config.review_hours)?;
        parse_into(&get, "BOT_MODE", &mut config.mode)?;

        let mut interval_secs = config.check_interval.as_secs();
        parse_into(&get, "CHECK_INTERVAL", &mut interval_secs)?;
        config.check_interval = Duration::from_secs(interval_secs);

        let mut timeout_secs = config.request_timeout.as_secs();
        parse_into(&get, "REQUEST_TIMEOUT", &mut timeout_secs)?;
        config.request_timeout = Duration::from_secs(timeout_secs);

        if let Some(v) = get("KLINE_INTERVAL") {
            config.kline_interval = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("REPORT_PATH") {
            config.report_path = PathBuf::from(v);
        }
        if let Some(v) = get("BINANCE_BASE_URL") {
            config.binance_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("BACKTEST_SYMBOL") {
            config.backtest_symbol = v.to_uppercase();
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v.to_lowercase();
        }

        config.notifications.discord_webhook_url = get("DISCORD_WEBHOOK_URL");
        config.notifications.telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        if get("TELEGRAM_CHAT_ID").is_some() {
            let mut chat_id = 0_i64;
            parse_into(&get, "TELEGRAM_CHAT_ID", &mut chat_id)?;
            config.notifications.telegram_chat_id = Some(chat_id);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: f64, reason: &str| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if self.initial_balance <= 0.0 {
            return Err(invalid("INITIAL_BALANCE", self.initial_balance, "must be positive"));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(invalid("FEE_RATE", self.fee_rate, "must be in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("MIN_CONFIDENCE", self.min_confidence, "must be in [0, 1]"));
        }
        Ok(())
    }
}

fn parse_into<T, G>(get: &G, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
