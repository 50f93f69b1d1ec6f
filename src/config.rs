//! Application configuration
//!
//! Values come from a YAML file layered with `MOEXTRADER__SECTION__KEY`
//! environment overrides. Missing optional values fall back to defaults.

use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "MOEXTRADER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid trading.interval {0:?}")]
    InvalidInterval(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tinkoff: TinkoffConfig,
    pub deepseek: DeepSeekConfig,
    pub trading: TradingConfig,
    pub telegram: TelegramConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TinkoffConfig {
    pub token: String,
    pub sandbox: bool,
    pub account_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepSeekConfig {
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    pub interval: String,
    pub max_position_rub: f64,
    pub min_confidence: u8,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
    pub candle_concurrency: i64,
    pub top_tickers: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    /// Load from `path` (format picked from the extension) plus environment
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .set_default("tinkoff.token", "")?
            .set_default("tinkoff.sandbox", false)?
            .set_default("tinkoff.account_id", "")?
            .set_default("tinkoff.base_url", "")?
            .set_default("deepseek.api_key", "")?
            .set_default("deepseek.model", "deepseek-reasoner")?
            .set_default("deepseek.timeout_seconds", 120)?
            .set_default("deepseek.base_url", crate::llm::client::DEFAULT_BASE_URL)?
            .set_default("trading.interval", "15m")?
            .set_default("trading.max_position_rub", 10000.0)?
            .set_default("trading.min_confidence", 70)?
            .set_default("trading.default_stop_loss_pct", 3.0)?
            .set_default("trading.default_take_profit_pct", 5.0)?
            .set_default("trading.candle_concurrency", 10)?
            .set_default("trading.top_tickers", 50)?
            .set_default("telegram.enabled", false)?
            .set_default("telegram.bot_token", "")?
            .set_default("telegram.chat_id", 0)?
            .set_default("database.url", "")?
            .set_default("logging.level", "info")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tinkoff.token.is_empty() {
            return Err(ConfigError::Missing("tinkoff.token"));
        }
        if self.deepseek.api_key.is_empty() {
            return Err(ConfigError::Missing("deepseek.api_key"));
        }
        if parse_interval(&self.trading.interval).is_none() {
            return Err(ConfigError::InvalidInterval(self.trading.interval.clone()));
        }
        if self.telegram.enabled {
            if self.telegram.bot_token.is_empty() {
                return Err(ConfigError::Missing("telegram.bot_token"));
            }
            if self.telegram.chat_id == 0 {
                return Err(ConfigError::Missing("telegram.chat_id"));
            }
        }
        Ok(())
    }

    pub fn is_sandbox(&self) -> bool {
        self.tinkoff.sandbox
    }

    pub fn trading_interval(&self) -> Duration {
        parse_interval(&self.trading.interval).unwrap_or(Duration::from_secs(15 * 60))
    }

    pub fn deepseek_timeout(&self) -> Duration {
        Duration::from_secs(self.deepseek.timeout_seconds)
    }

    /// Time zone of the exchange calendar
    pub fn exchange_tz(&self) -> Tz {
        chrono_tz::Europe::Moscow
    }
}

/// Parse intervals like `15m`, `1h30m`, `45s`
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        total += match ch {
            'h' => value * 3600,
            'm' => value * 60,
            's' => value,
            _ => return None,
        };
    }

    // Trailing number without a unit
    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("moextrader-{}.yaml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_interval("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_interval("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_interval("15"), None);
        assert_eq!(parse_interval("0m"), None);
        assert_eq!(parse_interval("soon"), None);
        assert_eq!(parse_interval(""), None);
    }

    #[test]
    fn test_load_applies_defaults() {
        let path = write_config(
            "tinkoff:\n  token: t-123\n  sandbox: true\ndeepseek:\n  api_key: sk-test\n",
        );

        let cfg = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert!(cfg.is_sandbox());
        assert_eq!(cfg.deepseek.model, "deepseek-reasoner");
        assert_eq!(cfg.trading_interval(), Duration::from_secs(900));
        assert_eq!(cfg.trading.min_confidence, 70);
        assert_eq!(cfg.trading.max_position_rub, 10000.0);
        assert_eq!(cfg.trading.candle_concurrency, 10);
        assert_eq!(cfg.deepseek_timeout(), Duration::from_secs(120));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_rejects_missing_token() {
        let path = write_config("deepseek:\n  api_key: sk-test\n");

        let err = AppConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("tinkoff.token")));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_telegram_requires_chat_id_when_enabled() {
        let path = write_config(
            "tinkoff:\n  token: t\ndeepseek:\n  api_key: k\ntelegram:\n  enabled: true\n  bot_token: abc\n",
        );

        let err = AppConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("telegram.chat_id")));

        std::fs::remove_file(path).ok();
    }
}
