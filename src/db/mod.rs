// Trade ledger and cycle history
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::models::{AnalysisLog, PortfolioSnapshot, Trade, TradeSide, TradeStatus};

pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

/// How many recent rows the startup check looks at
const RECONCILE_WINDOW: usize = 500;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

/// Durable record of trades, cycle outcomes and portfolio history
///
/// Rows are never deleted. Writes are independent; a crash between two
/// writes of one SELL leaves a closed BUY without its SELL row, which
/// [`reconcile`] reports.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn save_trade(&self, trade: &Trade) -> Result<(), LedgerError>;

    async fn update_trade(&self, trade: &Trade) -> Result<(), LedgerError>;

    /// Newest open BUY for `ticker`
    async fn open_trade_by_ticker(&self, ticker: &str) -> Result<Option<Trade>, LedgerError>;

    async fn open_trades(&self) -> Result<Vec<Trade>, LedgerError>;

    /// Newest first
    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, LedgerError>;

    /// Realized P&L over all closed SELL rows
    async fn total_pnl(&self) -> Result<f64, LedgerError>;

    /// Realized P&L of SELL rows closed at or after `since`
    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<f64, LedgerError>;

    async fn save_analysis_log(&self, log: &AnalysisLog) -> Result<(), LedgerError>;

    async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub open_positions: usize,
    /// Closed BUY rows with no later SELL row for the same ticker
    pub unpaired_closed_buys: Vec<Trade>,
}

/// Startup consistency check over the recent ledger
pub async fn reconcile(ledger: &dyn Ledger) -> Result<ReconcileReport, LedgerError> {
    let open = ledger.open_trades().await?;
    let mut recent = ledger.recent_trades(RECONCILE_WINDOW).await?;
    recent.sort_by_key(|t| t.created_at);

    // Pair each SELL with the oldest pending closed BUY of its ticker
    let mut pending: HashMap<String, VecDeque<Trade>> = HashMap::new();
    for trade in recent {
        match (trade.action, trade.status) {
            (TradeSide::Buy, TradeStatus::Closed) => {
                pending.entry(trade.ticker.clone()).or_default().push_back(trade);
            }
            (TradeSide::Sell, _) => {
                if let Some(queue) = pending.get_mut(&trade.ticker) {
                    queue.pop_front();
                }
            }
            _ => {}
        }
    }

    let mut unpaired: Vec<Trade> = pending.into_values().flatten().collect();
    unpaired.sort_by_key(|t| t.created_at);

    for trade in &unpaired {
        tracing::warn!(
            ticker = %trade.ticker,
            trade_id = %trade.id,
            "⚠️  Closed BUY has no matching SELL record"
        );
    }
    tracing::info!(
        "Ledger check: {} open positions, {} unpaired closed buys",
        open.len(),
        unpaired.len()
    );

    Ok(ReconcileReport {
        open_positions: open.len(),
        unpaired_closed_buys: unpaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trade(ticker: &str, side: TradeSide, status: TradeStatus, minutes_ago: i64) -> Trade {
        let mut t = Trade::new(ticker, side, 100.0, 1, "ord");
        t.status = status;
        t.created_at = Utc::now() - Duration::minutes(minutes_ago);
        t.updated_at = t.created_at;
        t
    }

    #[tokio::test]
    async fn test_reconcile_flags_closed_buy_without_sell() {
        let ledger = MemoryLedger::new();
        ledger
            .save_trade(&trade("SBER", TradeSide::Buy, TradeStatus::Closed, 60))
            .await
            .unwrap();
        ledger
            .save_trade(&trade("SBER", TradeSide::Sell, TradeStatus::Closed, 50))
            .await
            .unwrap();
        let orphan = trade("GAZP", TradeSide::Buy, TradeStatus::Closed, 40);
        ledger.save_trade(&orphan).await.unwrap();
        ledger
            .save_trade(&trade("LKOH", TradeSide::Buy, TradeStatus::Open, 30))
            .await
            .unwrap();

        let report = reconcile(&ledger).await.unwrap();

        assert_eq!(report.open_positions, 1);
        assert_eq!(report.unpaired_closed_buys.len(), 1);
        assert_eq!(report.unpaired_closed_buys[0].id, orphan.id);
    }

    #[tokio::test]
    async fn test_reconcile_sell_before_buy_does_not_pair() {
        let ledger = MemoryLedger::new();
        ledger
            .save_trade(&trade("SBER", TradeSide::Sell, TradeStatus::Closed, 90))
            .await
            .unwrap();
        ledger
            .save_trade(&trade("SBER", TradeSide::Buy, TradeStatus::Closed, 60))
            .await
            .unwrap();

        let report = reconcile(&ledger).await.unwrap();
        assert_eq!(report.unpaired_closed_buys.len(), 1);
    }
}
