use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{Ledger, LedgerError};
use crate::models::{AnalysisLog, PortfolioSnapshot, Trade, TradeSide, TradeStatus};

/// Process-local ledger used when no database is configured, and in tests
#[derive(Default)]
pub struct MemoryLedger {
    trades: RwLock<Vec<Trade>>,
    analysis_logs: RwLock<Vec<AnalysisLog>>,
    snapshots: RwLock<Vec<PortfolioSnapshot>>,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.trades.read().await.clone()
    }

    pub async fn analysis_logs(&self) -> Vec<AnalysisLog> {
        self.analysis_logs.read().await.clone()
    }

    pub async fn portfolio_snapshots(&self) -> Vec<PortfolioSnapshot> {
        self.snapshots.read().await.clone()
    }

    /// Number of write calls served, across all tables
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn is_closed_sell(t: &Trade) -> bool {
    t.action == TradeSide::Sell && t.status == TradeStatus::Closed
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn save_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.trades.write().await.push(trade.clone());
        Ok(())
    }

    async fn update_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut trades = self.trades.write().await;
        match trades.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) => {
                *existing = trade.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(LedgerError::Corrupt(format!("trade {} not found", trade.id))),
        }
    }

    async fn open_trade_by_ticker(&self, ticker: &str) -> Result<Option<Trade>, LedgerError> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.ticker == ticker && t.action == TradeSide::Buy && t.status == TradeStatus::Open)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn open_trades(&self) -> Result<Vec<Trade>, LedgerError> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.status == TradeStatus::Open)
            .cloned()
            .collect())
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, LedgerError> {
        let mut trades = self.trades.read().await.clone();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn total_pnl(&self) -> Result<f64, LedgerError> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| is_closed_sell(t))
            .map(|t| t.pnl)
            .sum())
    }

    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<f64, LedgerError> {
        Ok(self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| is_closed_sell(t) && t.updated_at >= since)
            .map(|t| t.pnl)
            .sum())
    }

    async fn save_analysis_log(&self, log: &AnalysisLog) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.analysis_logs.write().await.push(log.clone());
        Ok(())
    }

    async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), LedgerError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }
}
