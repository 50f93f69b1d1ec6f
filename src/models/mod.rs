use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One hourly price bar as returned by the broker's market data service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Per-instrument market picture for one cycle
///
/// Produced fresh every cycle and never persisted; only the derived
/// percentage changes reach the analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSnapshot {
    pub ticker: String,
    pub instrument_id: String,
    pub last_price: f64,
    pub price_3h_ago: f64,
    pub price_1d_ago: f64,
    pub price_3d_ago: f64,
    pub price_1w_ago: f64,
    pub volume_24h: f64,
}

/// Row of the exchange's "top by traded value" listing
#[derive(Debug, Clone, PartialEq)]
pub struct MarketTicker {
    pub ticker: String,
    pub value_today: f64, // turnover in RUB for the current session
    pub last_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub published: DateTime<Utc>,
}

/// Action requested by the AI
///
/// Anything other than BUY/SELL/HOLD is kept verbatim so it can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    Other(String),
}

impl From<String> for TradeAction {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => TradeAction::Buy,
            "SELL" => TradeAction::Sell,
            "HOLD" => TradeAction::Hold,
            _ => TradeAction::Other(raw),
        }
    }
}

impl From<TradeAction> for String {
    fn from(action: TradeAction) -> Self {
        match action {
            TradeAction::Buy => "BUY".to_string(),
            TradeAction::Sell => "SELL".to_string(),
            TradeAction::Hold => "HOLD".to_string(),
            TradeAction::Other(raw) => raw,
        }
    }
}

impl Default for TradeAction {
    fn default() -> Self {
        TradeAction::Other(String::new())
    }
}

/// A single structured decision parsed from the AI response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    pub confidence: u8, // 0-100
    #[serde(default)]
    pub reasoning: String,
    /// Explicit current price, when the model supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

/// Serialize decisions for the analysis log
pub fn decisions_to_json(decisions: &[TradeDecision]) -> String {
    serde_json::to_string(decisions).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

/// Ledger row for one executed order
///
/// At most one `Open` BUY row may exist per ticker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ticker: String,
    pub action: TradeSide,
    pub price: f64,
    pub quantity: i64, // lots
    pub order_id: String,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub stop_loss_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    pub pnl: f64,
    pub status: TradeStatus,
}

impl Trade {
    /// New ledger row stamped with the current time
    pub fn new(ticker: &str, action: TradeSide, price: f64, quantity: i64, order_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            ticker: ticker.to_string(),
            action,
            price,
            quantity,
            order_id: order_id.to_string(),
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            stop_loss_order_id: None,
            take_profit_order_id: None,
            pnl: 0.0,
            status: TradeStatus::Open,
        }
    }
}

/// Outcome record of one cycle attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisLog {
    pub instruments_count: usize,
    pub ai_response: String,
    pub decisions_json: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    pub total_rub: f64,
    pub available_rub: f64,
    pub positions_count: usize,
    pub positions_json: String,
}

impl PortfolioSnapshot {
    pub fn from_portfolio(portfolio: &PortfolioInfo) -> Self {
        Self {
            total_rub: portfolio.total_rub,
            available_rub: portfolio.available_rub,
            positions_count: portfolio.positions.len(),
            positions_json: serde_json::to_string(&portfolio.positions)
                .unwrap_or_else(|_| "[]".to_string()),
        }
    }
}

/// Broker account state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioInfo {
    pub total_rub: f64,
    pub available_rub: f64,
    pub positions: Vec<PositionInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionInfo {
    pub ticker: String,
    pub instrument_id: String,
    pub figi: String,
    /// Shares held
    pub quantity: f64,
    /// Same holding in exchange lots, the unit orders are placed in
    pub quantity_lots: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub pnl: f64,
}

/// Fill report for a market order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub executed_price: f64,
    pub executed_lots: i64,
}
