// Brokerage access: trait seam plus the Tinkoff Invest REST implementation
#[cfg(test)]
pub(crate) mod fake;
pub mod instrument_cache;
pub mod portfolio;
pub mod quotation;
pub mod tinkoff;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{Candle, OrderResult, PortfolioInfo};

pub use instrument_cache::InstrumentCache;
pub use portfolio::{LivePortfolio, PortfolioProvider, SandboxPortfolio};
pub use tinkoff::{TinkoffBroker, TradingMode};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("instrument not found: {0}")]
    NotFound(String),
    #[error("broker API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected broker response: {0}")]
    Decode(String),
}

/// Operations the trading pipeline needs from a brokerage account
#[async_trait]
pub trait Broker: Send + Sync {
    /// Resolve an exchange ticker to the broker's instrument id
    async fn resolve_instrument(&self, ticker: &str) -> Result<String, BrokerError>;

    /// Subset of `instrument_ids` currently open for API market orders
    async fn filter_tradable(&self, instrument_ids: &[String]) -> Result<HashSet<String>, BrokerError>;

    async fn portfolio(&self) -> Result<PortfolioInfo, BrokerError>;

    async fn available_cash(&self) -> Result<f64, BrokerError> {
        Ok(self.portfolio().await?.available_rub)
    }

    async fn hourly_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn buy(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError>;

    async fn sell(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError>;

    /// Returns `None` when the account mode does not support stop orders
    async fn place_stop_loss(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError>;

    async fn place_take_profit(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError>;

    /// Best-effort; failures are logged, never returned
    async fn cancel_stop_orders(&self, stop_order_ids: &[String]);
}
