use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::panic_message;
use crate::broker::Broker;
use crate::config::TradingConfig;
use crate::db::Ledger;
use crate::models::{Trade, TradeAction, TradeDecision, TradeSide, TradeStatus};
use crate::notify::Notifier;

/// Result of applying one decision
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed(String),
    Skipped(String),
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, ExecutionOutcome::Executed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub max_position_rub: f64,
    pub min_confidence: u8,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_position_rub: 10_000.0,
            min_confidence: 70,
            default_stop_loss_pct: 3.0,
            default_take_profit_pct: 5.0,
        }
    }
}

impl From<&TradingConfig> for ExecutorSettings {
    fn from(cfg: &TradingConfig) -> Self {
        Self {
            max_position_rub: cfg.max_position_rub,
            min_confidence: cfg.min_confidence,
            default_stop_loss_pct: cfg.default_stop_loss_pct,
            default_take_profit_pct: cfg.default_take_profit_pct,
        }
    }
}

/// Price used to size a BUY when no fill is known yet
///
/// An explicit price wins; otherwise it is backed out of the stop-loss
/// (placed 5% below) or the take-profit (5% above).
pub fn reference_price(decision: &TradeDecision) -> Option<f64> {
    let positive = |v: Option<f64>| v.filter(|p| *p > 0.0);

    positive(decision.current_price)
        .or_else(|| positive(decision.stop_loss).map(|sl| sl / 1.05))
        .or_else(|| positive(decision.take_profit).map(|tp| tp / 0.95))
}

/// Whole lots affordable with `budget` at `price`
pub fn lots_for(budget: f64, price: f64) -> i64 {
    if price <= 0.0 || budget <= 0.0 {
        return 0;
    }
    // absorb float error from the back-solved price (10000 / (250 / 1.05) = 41.999..)
    ((budget / price) * (1.0 + 1e-9)).floor() as i64
}

/// Turns AI decisions into broker orders and ledger rows
pub struct Executor {
    broker: Arc<dyn Broker>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        broker: Arc<dyn Broker>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            broker,
            ledger,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Apply decisions in order; a fault in one never affects the next
    ///
    /// Every `Failed` outcome is also sent to the notifier.
    pub async fn execute(&self, decisions: &[TradeDecision]) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(decisions.len());

        for decision in decisions {
            let outcome = match AssertUnwindSafe(self.execute_one(decision))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(ticker = %decision.ticker, "💥 Panic while executing decision: {}", message);
                    ExecutionOutcome::Failed(format!("panic: {}", message))
                }
            };

            if let ExecutionOutcome::Failed(reason) = &outcome {
                let action = String::from(decision.action.clone());
                self.notifier
                    .notify_error(&format!("{} {}", action, decision.ticker), reason)
                    .await;
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn execute_one(&self, decision: &TradeDecision) -> ExecutionOutcome {
        let trades = matches!(decision.action, TradeAction::Buy | TradeAction::Sell);
        if trades && decision.ticker.is_empty() {
            warn!(action = ?decision.action, "Decision has no ticker");
            return ExecutionOutcome::Failed("missing ticker".to_string());
        }

        match &decision.action {
            TradeAction::Buy => self.execute_buy(decision).await,
            TradeAction::Sell => self.execute_sell(decision).await,
            TradeAction::Hold => {
                info!(ticker = %decision.ticker, "HOLD: {}", decision.reasoning);
                ExecutionOutcome::Skipped("hold".to_string())
            }
            TradeAction::Other(raw) => {
                info!(ticker = %decision.ticker, action = %raw, "Unknown action ignored");
                ExecutionOutcome::Skipped(format!("unknown action {:?}", raw))
            }
        }
    }

    async fn execute_buy(&self, d: &TradeDecision) -> ExecutionOutcome {
        let ticker = d.ticker.as_str();

        if d.confidence < self.settings.min_confidence {
            info!(
                ticker,
                confidence = d.confidence,
                min = self.settings.min_confidence,
                "BUY skipped: low confidence"
            );
            return ExecutionOutcome::Skipped("low confidence".to_string());
        }

        match self.ledger.open_trade_by_ticker(ticker).await {
            Ok(Some(_)) => {
                info!(ticker, "BUY skipped: position already open");
                return ExecutionOutcome::Skipped("position already open".to_string());
            }
            Ok(None) => {}
            Err(e) => {
                error!(ticker, "Open position lookup failed: {}", e);
                return ExecutionOutcome::Failed(format!("ledger lookup: {}", e));
            }
        }

        let cash = match self.broker.available_cash().await {
            Ok(cash) => cash,
            Err(e) => {
                error!(ticker, "Failed to read available cash: {}", e);
                return ExecutionOutcome::Failed(format!("available cash: {}", e));
            }
        };
        let budget = self.settings.max_position_rub.min(cash);

        let instrument_id = match self.broker.resolve_instrument(ticker).await {
            Ok(id) => id,
            Err(e) => {
                error!(ticker, "Failed to resolve instrument: {}", e);
                return ExecutionOutcome::Failed(format!("resolve {}: {}", ticker, e));
            }
        };

        let Some(price) = reference_price(d) else {
            error!(ticker, "Cannot estimate price for lot sizing");
            return ExecutionOutcome::Failed("no reference price".to_string());
        };

        let lots = lots_for(budget, price);
        if lots < 1 {
            info!(ticker, budget, price, "BUY skipped: budget below one lot");
            return ExecutionOutcome::Skipped("insufficient funds for one lot".to_string());
        }

        let fill = match self.broker.buy(&instrument_id, lots).await {
            Ok(fill) => fill,
            Err(e) => {
                error!(ticker, lots, "❌ Buy order failed: {}", e);
                return ExecutionOutcome::Failed(format!("buy order: {}", e));
            }
        };

        let stop_loss = d
            .stop_loss
            .filter(|p| *p > 0.0)
            .unwrap_or(fill.executed_price * (1.0 - self.settings.default_stop_loss_pct / 100.0));
        let take_profit = d
            .take_profit
            .filter(|p| *p > 0.0)
            .unwrap_or(fill.executed_price * (1.0 + self.settings.default_take_profit_pct / 100.0));

        let stop_loss_order_id = self
            .broker
            .place_stop_loss(&instrument_id, fill.executed_lots, stop_loss)
            .await
            .unwrap_or_else(|e| {
                warn!(ticker, "Stop-loss placement failed: {}", e);
                None
            });
        let take_profit_order_id = self
            .broker
            .place_take_profit(&instrument_id, fill.executed_lots, take_profit)
            .await
            .unwrap_or_else(|e| {
                warn!(ticker, "Take-profit placement failed: {}", e);
                None
            });

        let mut trade = Trade::new(
            ticker,
            TradeSide::Buy,
            fill.executed_price,
            fill.executed_lots,
            &fill.order_id,
        );
        trade.stop_loss_price = stop_loss;
        trade.take_profit_price = take_profit;
        trade.stop_loss_order_id = stop_loss_order_id;
        trade.take_profit_order_id = take_profit_order_id;

        let saved = self.ledger.save_trade(&trade).await;

        self.notifier
            .notify_buy(ticker, fill.executed_price, fill.executed_lots, stop_loss, take_profit)
            .await;
        info!(
            ticker,
            price = fill.executed_price,
            lots = fill.executed_lots,
            sl = stop_loss,
            tp = take_profit,
            "✅ BUY executed"
        );

        if let Err(e) = saved {
            error!(ticker, "Failed to record BUY: {}", e);
            return ExecutionOutcome::Failed(format!("BUY filled but not recorded: {}", e));
        }

        ExecutionOutcome::Executed(format!(
            "bought {} lots of {} at {:.2}",
            fill.executed_lots, ticker, fill.executed_price
        ))
    }

    async fn execute_sell(&self, d: &TradeDecision) -> ExecutionOutcome {
        let ticker = d.ticker.as_str();

        let mut open = match self.ledger.open_trade_by_ticker(ticker).await {
            Ok(Some(trade)) => trade,
            Ok(None) => {
                info!(ticker, "SELL skipped: no open position");
                return ExecutionOutcome::Skipped("no open position".to_string());
            }
            Err(e) => {
                error!(ticker, "Open position lookup failed: {}", e);
                return ExecutionOutcome::Failed(format!("ledger lookup: {}", e));
            }
        };

        let instrument_id = match self.broker.resolve_instrument(ticker).await {
            Ok(id) => id,
            Err(e) => {
                error!(ticker, "Failed to resolve instrument for sell: {}", e);
                return ExecutionOutcome::Failed(format!("resolve {}: {}", ticker, e));
            }
        };

        let fill = match self.broker.sell(&instrument_id, open.quantity).await {
            Ok(fill) => fill,
            Err(e) => {
                error!(ticker, lots = open.quantity, "❌ Sell order failed: {}", e);
                return ExecutionOutcome::Failed(format!("sell order: {}", e));
            }
        };

        let stop_ids: Vec<String> = open
            .stop_loss_order_id
            .iter()
            .chain(open.take_profit_order_id.iter())
            .filter(|id| !id.is_empty())
            .cloned()
            .collect();
        self.broker.cancel_stop_orders(&stop_ids).await;

        let pnl = (fill.executed_price - open.price) * open.quantity as f64;

        open.pnl = pnl;
        open.status = TradeStatus::Closed;
        let mut write_errors = Vec::new();
        if let Err(e) = self.ledger.update_trade(&open).await {
            error!(ticker, "Failed to close BUY record: {}", e);
            write_errors.push(e.to_string());
        }

        let mut sell = Trade::new(
            ticker,
            TradeSide::Sell,
            fill.executed_price,
            fill.executed_lots,
            &fill.order_id,
        );
        sell.pnl = pnl;
        sell.status = TradeStatus::Closed;
        if let Err(e) = self.ledger.save_trade(&sell).await {
            error!(ticker, "Failed to record SELL: {}", e);
            write_errors.push(e.to_string());
        }

        self.notifier
            .notify_sell(ticker, fill.executed_price, fill.executed_lots, pnl)
            .await;
        info!(
            ticker,
            price = fill.executed_price,
            lots = fill.executed_lots,
            pnl,
            "✅ SELL executed"
        );

        if !write_errors.is_empty() {
            return ExecutionOutcome::Failed(format!(
                "SELL filled but not recorded: {}",
                write_errors.join("; ")
            ));
        }

        ExecutionOutcome::Executed(format!(
            "sold {} lots of {} at {:.2}, P&L {:.2}",
            fill.executed_lots, ticker, fill.executed_price, pnl
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fake::ScriptedBroker;
    use crate::db::{LedgerError, MemoryLedger};
    use crate::models::{AnalysisLog, PortfolioSnapshot};
    use crate::notify::RecordingNotifier;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct Harness {
        broker: Arc<ScriptedBroker>,
        ledger: Arc<MemoryLedger>,
        notifier: Arc<RecordingNotifier>,
        executor: Executor,
    }

    fn harness(broker: ScriptedBroker) -> Harness {
        let broker = Arc::new(broker);
        let ledger = Arc::new(MemoryLedger::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(
            broker.clone(),
            ledger.clone(),
            notifier.clone(),
            ExecutorSettings::default(),
        );
        Harness {
            broker,
            ledger,
            notifier,
            executor,
        }
    }

    fn buy(ticker: &str, confidence: u8) -> TradeDecision {
        TradeDecision {
            action: TradeAction::Buy,
            ticker: ticker.to_string(),
            stop_loss: Some(250.0),
            take_profit: Some(290.0),
            confidence,
            reasoning: "test".to_string(),
            current_price: None,
        }
    }

    fn sell(ticker: &str) -> TradeDecision {
        TradeDecision {
            action: TradeAction::Sell,
            ticker: ticker.to_string(),
            confidence: 80,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_price_order() {
        let mut d = buy("SBER", 80);
        d.current_price = Some(240.0);
        assert_eq!(reference_price(&d), Some(240.0));

        d.current_price = Some(0.0);
        assert_eq!(reference_price(&d), Some(250.0 / 1.05));

        d.stop_loss = None;
        assert_eq!(reference_price(&d), Some(290.0 / 0.95));

        d.take_profit = Some(-1.0);
        assert_eq!(reference_price(&d), None);
    }

    #[test]
    fn test_lots_for() {
        assert_eq!(lots_for(10_000.0, 250.0 / 1.05), 42);
        assert_eq!(lots_for(10_000.0, 100.0), 100);
        assert_eq!(lots_for(99.0, 100.0), 0);
        assert_eq!(lots_for(10_000.0, 0.0), 0);
    }

    #[tokio::test]
    async fn test_buy_opens_position_with_decision_levels() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0),
        );

        let outcomes = h.executor.execute(&[buy("SBER", 80)]).await;

        assert!(outcomes[0].is_executed(), "{:?}", outcomes[0]);
        assert_eq!(h.broker.calls_named("buy:uid-sber:42"), 1);

        let open = h.ledger.open_trade_by_ticker("SBER").await.unwrap().unwrap();
        assert_eq!(open.quantity, 42);
        assert_eq!(open.price, 238.1);
        assert_eq!(open.stop_loss_price, 250.0);
        assert_eq!(open.take_profit_price, 290.0);
        assert_eq!(open.stop_loss_order_id.as_deref(), Some("sl-uid-sber"));
        assert_eq!(open.take_profit_order_id.as_deref(), Some("tp-uid-sber"));
        assert_eq!(h.notifier.count_starting_with("🟢 BUY SBER"), 1);
    }

    #[tokio::test]
    async fn test_buy_uses_default_levels_without_decision_levels() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("GAZP", "uid-gazp", 100.0)
                .with_cash(50_000.0),
        );
        let decision = TradeDecision {
            action: TradeAction::Buy,
            ticker: "GAZP".to_string(),
            confidence: 90,
            current_price: Some(100.0),
            ..Default::default()
        };

        h.executor.execute(&[decision]).await;

        let open = h.ledger.open_trade_by_ticker("GAZP").await.unwrap().unwrap();
        assert_eq!(open.quantity, 100);
        assert!((open.stop_loss_price - 97.0).abs() < 1e-9);
        assert!((open.take_profit_price - 105.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_duplicate_buy_makes_no_calls_or_writes() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0),
        );
        h.ledger
            .save_trade(&Trade::new("SBER", TradeSide::Buy, 230.0, 10, "ord-0"))
            .await
            .unwrap();
        let writes_before = h.ledger.write_count();

        let outcomes = h.executor.execute(&[buy("SBER", 95)]).await;

        assert!(matches!(outcomes[0], ExecutionOutcome::Skipped(_)));
        assert!(h.broker.calls().is_empty());
        assert_eq!(h.ledger.write_count(), writes_before);
    }

    #[tokio::test]
    async fn test_low_confidence_skips() {
        let h = harness(ScriptedBroker::new().with_instrument("SBER", "uid-sber", 238.1));

        let outcomes = h.executor.execute(&[buy("SBER", 69)]).await;

        assert_eq!(outcomes[0], ExecutionOutcome::Skipped("low confidence".to_string()));
        assert!(h.broker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cash_caps_position() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(200.0),
        );

        let outcomes = h.executor.execute(&[buy("SBER", 80)]).await;

        assert!(matches!(outcomes[0], ExecutionOutcome::Skipped(_)));
        assert_eq!(h.broker.calls_named("buy:"), 0);
        assert!(h.ledger.trades().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_buy_notifies_and_writes_nothing() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0)
                .failing_buy(),
        );

        let outcomes = h.executor.execute(&[buy("SBER", 80)]).await;

        assert!(matches!(outcomes[0], ExecutionOutcome::Failed(_)));
        assert_eq!(h.ledger.write_count(), 0);
        assert_eq!(h.notifier.count_starting_with("⚠️ Ошибка: BUY SBER"), 1);
    }

    #[tokio::test]
    async fn test_stop_failures_still_record_position() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0)
                .failing_stops(),
        );

        let outcomes = h.executor.execute(&[buy("SBER", 80)]).await;

        assert!(outcomes[0].is_executed());
        let open = h.ledger.open_trade_by_ticker("SBER").await.unwrap().unwrap();
        assert_eq!(open.stop_loss_order_id, None);
        assert_eq!(open.take_profit_order_id, None);
    }

    #[tokio::test]
    async fn test_sell_realizes_pnl() {
        let h = harness(ScriptedBroker::new().with_instrument("SBER", "uid-sber", 112.5));
        let mut open = Trade::new("SBER", TradeSide::Buy, 100.0, 10, "ord-buy");
        open.stop_loss_order_id = Some("sl-1".to_string());
        open.take_profit_order_id = Some("tp-1".to_string());
        h.ledger.save_trade(&open).await.unwrap();

        let outcomes = h.executor.execute(&[sell("SBER")]).await;

        assert!(outcomes[0].is_executed(), "{:?}", outcomes[0]);
        assert_eq!(h.broker.calls_named("sell:uid-sber:10"), 1);
        assert_eq!(h.broker.calls_named("cancel:"), 2);

        let trades = h.ledger.trades().await;
        assert_eq!(trades.len(), 2);
        let closed = trades.iter().find(|t| t.id == open.id).unwrap();
        assert_eq!(closed.status, TradeStatus::Closed);
        assert_eq!(closed.pnl, 125.0);

        let audit = trades.iter().find(|t| t.action == TradeSide::Sell).unwrap();
        assert_eq!(audit.status, TradeStatus::Closed);
        assert_eq!(audit.pnl, 125.0);
        assert_eq!(audit.price, 112.5);
        assert_eq!(h.ledger.total_pnl().await.unwrap(), 125.0);
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_position_open() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 112.5)
                .failing_sell(),
        );
        h.ledger
            .save_trade(&Trade::new("SBER", TradeSide::Buy, 100.0, 10, "ord-buy"))
            .await
            .unwrap();

        let outcomes = h.executor.execute(&[sell("SBER")]).await;

        assert!(matches!(outcomes[0], ExecutionOutcome::Failed(_)));
        assert!(h.ledger.open_trade_by_ticker("SBER").await.unwrap().is_some());
        assert_eq!(h.broker.calls_named("cancel:"), 0);
        assert_eq!(h.notifier.count_starting_with("⚠️ Ошибка: SELL SBER"), 1);
    }

    #[tokio::test]
    async fn test_sell_without_position_skips() {
        let h = harness(ScriptedBroker::new().with_instrument("SBER", "uid-sber", 112.5));

        let outcomes = h.executor.execute(&[sell("SBER")]).await;

        assert_eq!(outcomes[0], ExecutionOutcome::Skipped("no open position".to_string()));
        assert!(h.broker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_hold_and_unknown_are_noops() {
        let h = harness(ScriptedBroker::new());
        let hold = TradeDecision {
            action: TradeAction::Hold,
            ticker: "SBER".to_string(),
            ..Default::default()
        };
        let short = TradeDecision {
            action: TradeAction::Other("SHORT".to_string()),
            ticker: "SBER".to_string(),
            ..Default::default()
        };

        let outcomes = h.executor.execute(&[hold, short]).await;

        assert!(outcomes.iter().all(|o| matches!(o, ExecutionOutcome::Skipped(_))));
        assert!(h.broker.calls().is_empty());
        assert_eq!(h.ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_one_decision() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_instrument("GAZP", "uid-gazp", 238.1)
                .with_cash(50_000.0)
                .panicking_buy("uid-sber"),
        );

        let outcomes = h.executor.execute(&[buy("SBER", 80), buy("GAZP", 80)]).await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], ExecutionOutcome::Failed(m) if m.starts_with("panic")));
        assert!(outcomes[1].is_executed());
        assert!(h.ledger.open_trade_by_ticker("GAZP").await.unwrap().is_some());
        assert_eq!(h.notifier.count_starting_with("⚠️ Ошибка: BUY SBER\npanic"), 1);
    }

    #[tokio::test]
    async fn test_every_failure_is_notified() {
        let h = harness(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0),
        );
        let unpriced = TradeDecision {
            action: TradeAction::Buy,
            ticker: "SBER".to_string(),
            confidence: 90,
            ..Default::default()
        };

        let outcomes = h.executor.execute(&[unpriced, buy("NOPE", 80)]).await;

        assert_eq!(outcomes[0], ExecutionOutcome::Failed("no reference price".to_string()));
        assert!(matches!(&outcomes[1], ExecutionOutcome::Failed(m) if m.starts_with("resolve NOPE")));
        assert_eq!(
            h.notifier.messages(),
            vec![
                "⚠️ Ошибка: BUY SBER\nno reference price".to_string(),
                "⚠️ Ошибка: BUY NOPE\nresolve NOPE: instrument not found: NOPE".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_are_not_notified() {
        let h = harness(ScriptedBroker::new().with_instrument("SBER", "uid-sber", 238.1));

        h.executor.execute(&[buy("SBER", 10), sell("SBER")]).await;

        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ticker_fails_before_broker_calls() {
        let h = harness(ScriptedBroker::new().with_cash(50_000.0));

        let outcomes = h.executor.execute(&[buy("", 90), sell("")]).await;

        assert!(outcomes
            .iter()
            .all(|o| *o == ExecutionOutcome::Failed("missing ticker".to_string())));
        assert!(h.broker.calls().is_empty());
        assert_eq!(h.ledger.write_count(), 0);
        assert_eq!(h.notifier.count_starting_with("⚠️ Ошибка: BUY"), 1);
        assert_eq!(h.notifier.count_starting_with("⚠️ Ошибка: SELL"), 1);
    }

    struct BrokenLedger;

    #[async_trait]
    impl Ledger for BrokenLedger {
        async fn save_trade(&self, _: &Trade) -> Result<(), LedgerError> {
            Err(LedgerError::Corrupt("offline".to_string()))
        }
        async fn update_trade(&self, _: &Trade) -> Result<(), LedgerError> {
            Err(LedgerError::Corrupt("offline".to_string()))
        }
        async fn open_trade_by_ticker(&self, _: &str) -> Result<Option<Trade>, LedgerError> {
            Err(LedgerError::Corrupt("offline".to_string()))
        }
        async fn open_trades(&self) -> Result<Vec<Trade>, LedgerError> {
            Ok(Vec::new())
        }
        async fn recent_trades(&self, _: usize) -> Result<Vec<Trade>, LedgerError> {
            Ok(Vec::new())
        }
        async fn total_pnl(&self) -> Result<f64, LedgerError> {
            Ok(0.0)
        }
        async fn pnl_since(&self, _: DateTime<Utc>) -> Result<f64, LedgerError> {
            Ok(0.0)
        }
        async fn save_analysis_log(&self, _: &AnalysisLog) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn save_portfolio_snapshot(&self, _: &PortfolioSnapshot) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ledger_lookup_error_blocks_buy() {
        let broker = Arc::new(
            ScriptedBroker::new()
                .with_instrument("SBER", "uid-sber", 238.1)
                .with_cash(50_000.0),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(
            broker.clone(),
            Arc::new(BrokenLedger),
            notifier.clone(),
            ExecutorSettings::default(),
        );

        let outcomes = executor.execute(&[buy("SBER", 80)]).await;

        assert!(matches!(outcomes[0], ExecutionOutcome::Failed(_)));
        assert!(broker.calls().is_empty());
        assert_eq!(notifier.count_starting_with("⚠️ Ошибка: BUY SBER\nledger lookup"), 1);
    }
}
