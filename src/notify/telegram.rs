use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{format_buy, format_error, format_sell, Notifier};
use crate::config::TelegramConfig;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Telegram Bot API notifier; a disabled notifier drops every message
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: i64,
    enabled: bool,
}

impl TelegramNotifier {
    pub fn new(cfg: &TelegramConfig) -> Self {
        Self::with_base_url(cfg, TELEGRAM_API_URL)
    }

    pub fn with_base_url(cfg: &TelegramConfig, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id,
            enabled: cfg.enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TelegramConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, text: &str) {
        if !self.enabled {
            return;
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let request = SendMessageRequest {
            chat_id: self.chat_id,
            text,
        };

        match self.client.post(&url).json(&request).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("📨 Telegram message sent");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("Telegram API error {}: {}", status, body);
            }
            Err(e) => warn!("Failed to send Telegram message: {}", e),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_buy(&self, ticker: &str, price: f64, lots: i64, stop_loss: f64, take_profit: f64) {
        self.send(&format_buy(ticker, price, lots, stop_loss, take_profit)).await;
    }

    async fn notify_sell(&self, ticker: &str, price: f64, lots: i64, pnl: f64) {
        self.send(&format_sell(ticker, price, lots, pnl)).await;
    }

    async fn notify_error(&self, context: &str, error: &str) {
        self.send(&format_error(context, error)).await;
    }

    async fn notify_status(&self, message: &str) {
        self.send(message).await;
    }
}
