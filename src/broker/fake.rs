//! Scripted in-memory broker for pipeline tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Broker, BrokerError};
use crate::models::{Candle, OrderResult, PortfolioInfo};

#[derive(Default)]
pub struct ScriptedBroker {
    instruments: HashMap<String, String>,
    fill_prices: HashMap<String, f64>,
    tradable: HashSet<String>,
    candles: HashMap<String, Vec<Candle>>,
    failing_candles: HashSet<String>,
    candle_delay: Option<Duration>,
    portfolio: PortfolioInfo,
    fail_portfolio: bool,
    fail_buy: bool,
    fail_sell: bool,
    fail_stops: bool,
    panic_on_buy: Option<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tradable instrument that fills market orders at `fill_price`
    pub fn with_instrument(mut self, ticker: &str, uid: &str, fill_price: f64) -> Self {
        self.instruments.insert(ticker.to_string(), uid.to_string());
        self.fill_prices.insert(uid.to_string(), fill_price);
        self.tradable.insert(uid.to_string());
        self
    }

    pub fn with_untradable(mut self, uid: &str) -> Self {
        self.tradable.remove(uid);
        self
    }

    pub fn with_candles(mut self, uid: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(uid.to_string(), candles);
        self
    }

    pub fn with_failing_candles(mut self, uid: &str) -> Self {
        self.failing_candles.insert(uid.to_string());
        self
    }

    pub fn with_candle_delay(mut self, delay: Duration) -> Self {
        self.candle_delay = Some(delay);
        self
    }

    pub fn with_cash(mut self, cash: f64) -> Self {
        self.portfolio.available_rub = cash;
        self.portfolio.total_rub = cash;
        self
    }

    pub fn with_portfolio(mut self, portfolio: PortfolioInfo) -> Self {
        self.portfolio = portfolio;
        self
    }

    pub fn failing_portfolio(mut self) -> Self {
        self.fail_portfolio = true;
        self
    }

    pub fn failing_buy(mut self) -> Self {
        self.fail_buy = true;
        self
    }

    pub fn failing_sell(mut self) -> Self {
        self.fail_sell = true;
        self
    }

    pub fn failing_stops(mut self) -> Self {
        self.fail_stops = true;
        self
    }

    pub fn panicking_buy(mut self, uid: &str) -> Self {
        self.panic_on_buy = Some(uid.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_named(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn max_concurrent_candle_requests(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn fill(&self, uid: &str, lots: i64, side: &str) -> OrderResult {
        OrderResult {
            order_id: format!("{}-{}", side, uid),
            executed_price: self.fill_prices.get(uid).copied().unwrap_or(0.0),
            executed_lots: lots,
        }
    }

    fn rejected(what: &str) -> BrokerError {
        BrokerError::Api {
            status: 400,
            message: format!("{} rejected", what),
        }
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn resolve_instrument(&self, ticker: &str) -> Result<String, BrokerError> {
        self.record(format!("resolve:{}", ticker));
        self.instruments
            .get(ticker)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(ticker.to_string()))
    }

    async fn filter_tradable(&self, instrument_ids: &[String]) -> Result<HashSet<String>, BrokerError> {
        self.record("filter_tradable".to_string());
        Ok(instrument_ids
            .iter()
            .filter(|id| self.tradable.contains(*id))
            .cloned()
            .collect())
    }

    async fn portfolio(&self) -> Result<PortfolioInfo, BrokerError> {
        self.record("portfolio".to_string());
        if self.fail_portfolio {
            return Err(Self::rejected("portfolio"));
        }
        Ok(self.portfolio.clone())
    }

    async fn hourly_candles(
        &self,
        instrument_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, BrokerError> {
        self.record(format!("candles:{}", instrument_id));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.candle_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_candles.contains(instrument_id) {
            return Err(Self::rejected("candles"));
        }
        Ok(self.candles.get(instrument_id).cloned().unwrap_or_default())
    }

    async fn buy(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError> {
        self.record(format!("buy:{}:{}", instrument_id, lots));
        if self.panic_on_buy.as_deref() == Some(instrument_id) {
            panic!("scripted panic while buying {}", instrument_id);
        }
        if self.fail_buy {
            return Err(Self::rejected("buy"));
        }
        Ok(self.fill(instrument_id, lots, "buy"))
    }

    async fn sell(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError> {
        self.record(format!("sell:{}:{}", instrument_id, lots));
        if self.fail_sell {
            return Err(Self::rejected("sell"));
        }
        Ok(self.fill(instrument_id, lots, "sell"))
    }

    async fn place_stop_loss(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError> {
        self.record(format!("stop_loss:{}:{}:{}", instrument_id, lots, price));
        if self.fail_stops {
            return Err(Self::rejected("stop-loss"));
        }
        Ok(Some(format!("sl-{}", instrument_id)))
    }

    async fn place_take_profit(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError> {
        self.record(format!("take_profit:{}:{}:{}", instrument_id, lots, price));
        if self.fail_stops {
            return Err(Self::rejected("take-profit"));
        }
        Ok(Some(format!("tp-{}", instrument_id)))
    }

    async fn cancel_stop_orders(&self, stop_order_ids: &[String]) {
        for id in stop_order_ids {
            self.record(format!("cancel:{}", id));
        }
    }
}
