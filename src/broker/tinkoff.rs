use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::instrument_cache::InstrumentCache;
use super::portfolio::{LivePortfolio, PortfolioProvider, SandboxPortfolio};
use super::quotation::{de_i64_flexible, ser_i64_string, MoneyValue, Quotation};
use super::{Broker, BrokerError};
use crate::config::TinkoffConfig;
use crate::models::{Candle, OrderResult, PortfolioInfo, PositionInfo};

pub const LIVE_REST_URL: &str = "https://invest-public-api.tinkoff.ru/rest";
pub const SANDBOX_REST_URL: &str = "https://sandbox-invest-public-api.tinkoff.ru/rest";

const SERVICE_PREFIX: &str = "tinkoff.public.invest.api.contract.v1";
const SANDBOX_PAY_IN_RUB: i64 = 1_000_000;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Live,
    Sandbox,
}

impl TradingMode {
    pub fn from_sandbox_flag(sandbox: bool) -> Self {
        if sandbox {
            TradingMode::Sandbox
        } else {
            TradingMode::Live
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            TradingMode::Live => LIVE_REST_URL,
            TradingMode::Sandbox => SANDBOX_REST_URL,
        }
    }

    fn post_order_method(self) -> &'static str {
        match self {
            TradingMode::Live => "OrdersService/PostOrder",
            TradingMode::Sandbox => "SandboxService/PostSandboxOrder",
        }
    }

    fn portfolio_provider(self) -> Box<dyn PortfolioProvider> {
        match self {
            TradingMode::Live => Box::new(LivePortfolio),
            TradingMode::Sandbox => Box::new(SandboxPortfolio),
        }
    }
}

/// Thin JSON transport for the Invest REST gateway
///
/// Every call is `POST {base}/{service}/{method}` with a bearer token.
#[derive(Clone)]
pub struct TinkoffClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TinkoffClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, BrokerError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Call `method`, given either fully qualified or relative to the contract package
    pub async fn post<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp, BrokerError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = if method.starts_with(SERVICE_PREFIX) {
            format!("{}/{}", self.base_url, method)
        } else {
            format!("{}/{}.{}", self.base_url, SERVICE_PREFIX, method)
        };

        for attempt in 1..=MAX_RETRIES {
            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(
                        "Network error calling {}: {}, retrying (attempt {}/{})",
                        method, e, attempt, MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                return serde_json::from_str(&text)
                    .map_err(|e| BrokerError::Decode(format!("{}: {}", method, e)));
            }

            if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES {
                let backoff_secs = 2u64.pow(attempt);
                warn!(
                    "Broker returned {} for {}, backing off for {}s (attempt {}/{})",
                    status, method, backoff_secs, attempt, MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                continue;
            }

            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BrokerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Err(BrokerError::Api {
            status: 429,
            message: format!("{} retries exhausted", method),
        })
    }
}

// ---- wire types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindInstrumentRequest<'a> {
    query: &'a str,
    instrument_kind: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FindInstrumentResponse {
    #[serde(default)]
    instruments: Vec<InstrumentShort>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InstrumentShort {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    uid: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentByRequest<'a> {
    id_type: &'static str,
    id: &'a str,
}

#[derive(Deserialize)]
struct InstrumentByResponse {
    instrument: InstrumentShort,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TradingStatusesRequest<'a> {
    instrument_id: &'a [String],
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TradingStatusesResponse {
    #[serde(default)]
    trading_statuses: Vec<TradingStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradingStatus {
    #[serde(default)]
    instrument_uid: String,
    #[serde(default)]
    api_trade_available_flag: bool,
    #[serde(default)]
    market_order_available_flag: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CandlesRequest<'a> {
    instrument_id: &'a str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    interval: &'static str,
}

#[derive(Deserialize, Default)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<HistoricCandle>,
}

#[derive(Deserialize)]
struct HistoricCandle {
    #[serde(default)]
    open: Quotation,
    #[serde(default)]
    high: Quotation,
    #[serde(default)]
    low: Quotation,
    #[serde(default)]
    close: Quotation,
    #[serde(default, deserialize_with = "de_i64_flexible")]
    volume: i64,
    time: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostOrderRequest<'a> {
    instrument_id: &'a str,
    #[serde(serialize_with = "ser_i64_string")]
    quantity: i64,
    direction: &'static str,
    account_id: &'a str,
    order_type: &'static str,
    order_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostOrderResponse {
    #[serde(default)]
    order_id: String,
    #[serde(default, deserialize_with = "de_i64_flexible")]
    lots_executed: i64,
    #[serde(default)]
    executed_order_price: MoneyValue,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostStopOrderRequest<'a> {
    instrument_id: &'a str,
    #[serde(serialize_with = "ser_i64_string")]
    quantity: i64,
    stop_price: Quotation,
    direction: &'static str,
    account_id: &'a str,
    expiration_type: &'static str,
    stop_order_type: &'static str,
    order_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostStopOrderResponse {
    #[serde(default)]
    stop_order_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelStopOrderRequest<'a> {
    account_id: &'a str,
    stop_order_id: &'a str,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Deserialize, Default)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct Account {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSandboxAccountResponse {
    account_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SandboxPayInRequest<'a> {
    account_id: &'a str,
    amount: MoneyValue,
}

#[derive(Deserialize)]
struct Ignored {}

#[derive(Debug, Clone, Copy)]
enum StopKind {
    StopLoss,
    TakeProfit,
}

impl StopKind {
    fn wire(self) -> &'static str {
        match self {
            StopKind::StopLoss => "STOP_ORDER_TYPE_STOP_LOSS",
            StopKind::TakeProfit => "STOP_ORDER_TYPE_TAKE_PROFIT",
        }
    }

    fn label(self) -> &'static str {
        match self {
            StopKind::StopLoss => "stop-loss",
            StopKind::TakeProfit => "take-profit",
        }
    }
}

/// Brokerage account backed by the Tinkoff Invest REST API
pub struct TinkoffBroker {
    client: TinkoffClient,
    mode: TradingMode,
    account_id: String,
    portfolio: Box<dyn PortfolioProvider>,
    cache: InstrumentCache,
}

impl TinkoffBroker {
    /// Build from config, resolving (or in sandbox, opening) the account
    pub async fn connect(cfg: &TinkoffConfig) -> Result<Self, BrokerError> {
        let mode = TradingMode::from_sandbox_flag(cfg.sandbox);
        let base_url = if cfg.base_url.is_empty() {
            mode.default_base_url()
        } else {
            cfg.base_url.as_str()
        };
        let client = TinkoffClient::new(base_url, &cfg.token)?;

        let account_id = if !cfg.account_id.is_empty() {
            cfg.account_id.clone()
        } else {
            match mode {
                TradingMode::Live => Self::first_account(&client, "UsersService/GetAccounts").await?,
                TradingMode::Sandbox => Self::setup_sandbox(&client).await?,
            }
        };

        info!("🏦 Broker connected ({:?} mode, account {})", mode, account_id);
        Ok(Self::with_account(client, mode, &account_id))
    }

    pub fn with_account(client: TinkoffClient, mode: TradingMode, account_id: &str) -> Self {
        Self {
            client,
            mode,
            account_id: account_id.to_string(),
            portfolio: mode.portfolio_provider(),
            cache: InstrumentCache::default(),
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn first_account(client: &TinkoffClient, method: &str) -> Result<String, BrokerError> {
        let resp: AccountsResponse = client.post(method, &Empty {}).await?;
        resp.accounts
            .into_iter()
            .next()
            .map(|a| a.id)
            .ok_or_else(|| BrokerError::NotFound("brokerage account".to_string()))
    }

    async fn setup_sandbox(client: &TinkoffClient) -> Result<String, BrokerError> {
        if let Ok(existing) = Self::first_account(client, "SandboxService/GetSandboxAccounts").await {
            return Ok(existing);
        }

        let opened: OpenSandboxAccountResponse = client
            .post("SandboxService/OpenSandboxAccount", &Empty {})
            .await?;

        let _: Ignored = client
            .post(
                "SandboxService/SandboxPayIn",
                &SandboxPayInRequest {
                    account_id: &opened.account_id,
                    amount: MoneyValue::rub(SANDBOX_PAY_IN_RUB),
                },
            )
            .await?;

        info!(
            "💰 Sandbox account {} funded with {} RUB",
            opened.account_id, SANDBOX_PAY_IN_RUB
        );
        Ok(opened.account_id)
    }

    async fn ticker_for(&self, instrument_id: &str) -> Result<String, BrokerError> {
        if let Some(ticker) = self.cache.ticker(instrument_id) {
            return Ok(ticker);
        }

        let resp: InstrumentByResponse = self
            .client
            .post(
                "InstrumentsService/GetInstrumentBy",
                &InstrumentByRequest {
                    id_type: "INSTRUMENT_ID_TYPE_UID",
                    id: instrument_id,
                },
            )
            .await?;

        self.cache.insert(&resp.instrument.ticker, instrument_id);
        Ok(resp.instrument.ticker)
    }

    async fn market_order(
        &self,
        instrument_id: &str,
        lots: i64,
        direction: &'static str,
    ) -> Result<OrderResult, BrokerError> {
        let resp: PostOrderResponse = self
            .client
            .post(
                self.mode.post_order_method(),
                &PostOrderRequest {
                    instrument_id,
                    quantity: lots,
                    direction,
                    account_id: &self.account_id,
                    order_type: "ORDER_TYPE_MARKET",
                    order_id: Uuid::new_v4().to_string(),
                },
            )
            .await?;

        Ok(OrderResult {
            order_id: resp.order_id,
            executed_price: resp.executed_order_price.to_f64(),
            executed_lots: resp.lots_executed,
        })
    }

    async fn stop_order(
        &self,
        kind: StopKind,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError> {
        if self.mode == TradingMode::Sandbox {
            info!(
                instrument = %instrument_id,
                price,
                "{} skipped in sandbox mode",
                kind.label()
            );
            return Ok(None);
        }

        let resp: PostStopOrderResponse = self
            .client
            .post(
                "StopOrdersService/PostStopOrder",
                &PostStopOrderRequest {
                    instrument_id,
                    quantity: lots,
                    stop_price: Quotation::from_f64(price),
                    direction: "STOP_ORDER_DIRECTION_SELL",
                    account_id: &self.account_id,
                    expiration_type: "STOP_ORDER_EXPIRATION_TYPE_GOOD_TILL_CANCEL",
                    stop_order_type: kind.wire(),
                    order_id: Uuid::new_v4().to_string(),
                },
            )
            .await?;

        Ok(Some(resp.stop_order_id).filter(|id| !id.is_empty()))
    }
}

#[async_trait]
impl Broker for TinkoffBroker {
    async fn resolve_instrument(&self, ticker: &str) -> Result<String, BrokerError> {
        if let Some(uid) = self.cache.instrument_id(ticker) {
            return Ok(uid);
        }

        let resp: FindInstrumentResponse = self
            .client
            .post(
                "InstrumentsService/FindInstrument",
                &FindInstrumentRequest {
                    query: ticker,
                    instrument_kind: "INSTRUMENT_TYPE_SHARE",
                },
            )
            .await?;

        // Exact ticker match wins, otherwise take the first hit
        let found = resp
            .instruments
            .iter()
            .find(|i| i.ticker == ticker)
            .or_else(|| resp.instruments.first())
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(ticker.to_string()))?;

        debug!(ticker = %ticker, uid = %found.uid, "resolved instrument");
        self.cache.insert(&found.ticker, &found.uid);
        if found.ticker != ticker {
            self.cache.insert_alias(ticker, &found.uid);
        }
        Ok(found.uid)
    }

    async fn filter_tradable(&self, instrument_ids: &[String]) -> Result<HashSet<String>, BrokerError> {
        if instrument_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let resp: TradingStatusesResponse = self
            .client
            .post(
                "MarketDataService/GetTradingStatuses",
                &TradingStatusesRequest {
                    instrument_id: instrument_ids,
                },
            )
            .await?;

        Ok(resp
            .trading_statuses
            .into_iter()
            .filter(|s| s.api_trade_available_flag && s.market_order_available_flag)
            .map(|s| s.instrument_uid)
            .collect())
    }

    async fn portfolio(&self) -> Result<PortfolioInfo, BrokerError> {
        let resp = self.portfolio.fetch(&self.client, &self.account_id).await?;

        let mut info = PortfolioInfo {
            total_rub: resp.total_amount_portfolio.to_f64(),
            available_rub: resp.total_amount_currencies.to_f64(),
            positions: Vec::new(),
        };

        for pos in resp.positions.iter().filter(|p| !p.is_currency()) {
            let ticker = match self.ticker_for(&pos.instrument_uid).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(uid = %pos.instrument_uid, "could not resolve position ticker: {}", e);
                    String::new()
                }
            };

            info.positions.push(PositionInfo {
                ticker,
                instrument_id: pos.instrument_uid.clone(),
                figi: pos.figi.clone(),
                quantity: pos.quantity.to_f64(),
                quantity_lots: pos.quantity_lots.to_f64(),
                avg_price: pos.average_position_price.to_f64(),
                current_price: pos.current_price.to_f64(),
                pnl: pos.expected_yield.to_f64(),
            });
        }

        debug!(
            "Portfolio via {} provider: {} positions",
            self.portfolio.name(),
            info.positions.len()
        );
        Ok(info)
    }

    async fn hourly_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, BrokerError> {
        let resp: CandlesResponse = self
            .client
            .post(
                "MarketDataService/GetCandles",
                &CandlesRequest {
                    instrument_id,
                    from,
                    to,
                    interval: "CANDLE_INTERVAL_HOUR",
                },
            )
            .await?;

        Ok(resp
            .candles
            .into_iter()
            .map(|c| Candle {
                timestamp: c.time,
                open: c.open.to_f64(),
                high: c.high.to_f64(),
                low: c.low.to_f64(),
                close: c.close.to_f64(),
                volume: c.volume as f64,
            })
            .collect())
    }

    async fn buy(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError> {
        self.market_order(instrument_id, lots, "ORDER_DIRECTION_BUY").await
    }

    async fn sell(&self, instrument_id: &str, lots: i64) -> Result<OrderResult, BrokerError> {
        self.market_order(instrument_id, lots, "ORDER_DIRECTION_SELL").await
    }

    async fn place_stop_loss(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError> {
        self.stop_order(StopKind::StopLoss, instrument_id, lots, price).await
    }

    async fn place_take_profit(
        &self,
        instrument_id: &str,
        lots: i64,
        price: f64,
    ) -> Result<Option<String>, BrokerError> {
        self.stop_order(StopKind::TakeProfit, instrument_id, lots, price).await
    }

    async fn cancel_stop_orders(&self, stop_order_ids: &[String]) {
        if self.mode == TradingMode::Sandbox {
            return;
        }

        for id in stop_order_ids.iter().filter(|id| !id.is_empty()) {
            let result: Result<Ignored, _> = self
                .client
                .post(
                    "StopOrdersService/CancelStopOrder",
                    &CancelStopOrderRequest {
                        account_id: &self.account_id,
                        stop_order_id: id,
                    },
                )
                .await;
            if let Err(e) = result {
                error!(order_id = %id, "Failed to cancel stop order: {}", e);
            }
        }
    }
}
