use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Ledger, LedgerError};
use crate::models::{AnalysisLog, PortfolioSnapshot, Trade, TradeSide, TradeStatus};

const TRADE_COLUMNS: &str = "id, created_at, updated_at, ticker, action, price, quantity, order_id, \
     stop_loss_price, take_profit_price, stop_loss_order_id, take_profit_order_id, pnl, status";

/// Postgres-backed ledger
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("🗄️  Connected to Postgres ledger");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn trade_from_row(row: &PgRow) -> Result<Trade, LedgerError> {
    let action: String = row.try_get("action")?;
    let status: String = row.try_get("status")?;
    let id: Uuid = row.try_get("id")?;

    let action = match action.as_str() {
        "BUY" => TradeSide::Buy,
        "SELL" => TradeSide::Sell,
        other => return Err(LedgerError::Corrupt(format!("trade {} has action {:?}", id, other))),
    };
    let status = match status.as_str() {
        "open" => TradeStatus::Open,
        "closed" => TradeStatus::Closed,
        other => return Err(LedgerError::Corrupt(format!("trade {} has status {:?}", id, other))),
    };

    Ok(Trade {
        id,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        ticker: row.try_get("ticker")?,
        action,
        price: to_f64(row.try_get("price")?),
        quantity: row.try_get("quantity")?,
        order_id: row.try_get("order_id")?,
        stop_loss_price: to_f64(row.try_get("stop_loss_price")?),
        take_profit_price: to_f64(row.try_get("take_profit_price")?),
        stop_loss_order_id: row.try_get("stop_loss_order_id")?,
        take_profit_order_id: row.try_get("take_profit_order_id")?,
        pnl: to_f64(row.try_get("pnl")?),
        status,
    })
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn save_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, created_at, updated_at, ticker, action, price, quantity, order_id,
                stop_loss_price, take_profit_price, stop_loss_order_id, take_profit_order_id,
                pnl, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(trade.id)
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .bind(&trade.ticker)
        .bind(trade.action.as_str())
        .bind(to_decimal(trade.price))
        .bind(trade.quantity)
        .bind(&trade.order_id)
        .bind(to_decimal(trade.stop_loss_price))
        .bind(to_decimal(trade.take_profit_price))
        .bind(&trade.stop_loss_order_id)
        .bind(&trade.take_profit_order_id)
        .bind(to_decimal(trade.pnl))
        .bind(trade.status.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved {} trade {} for {}", trade.action.as_str(), trade.id, trade.ticker);
        Ok(())
    }

    async fn update_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE trades SET
                price = $2,
                quantity = $3,
                order_id = $4,
                stop_loss_price = $5,
                take_profit_price = $6,
                stop_loss_order_id = $7,
                take_profit_order_id = $8,
                pnl = $9,
                status = $10,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(trade.id)
        .bind(to_decimal(trade.price))
        .bind(trade.quantity)
        .bind(&trade.order_id)
        .bind(to_decimal(trade.stop_loss_price))
        .bind(to_decimal(trade.take_profit_price))
        .bind(&trade.stop_loss_order_id)
        .bind(&trade.take_profit_order_id)
        .bind(to_decimal(trade.pnl))
        .bind(trade.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Corrupt(format!("trade {} not found", trade.id)));
        }
        Ok(())
    }

    async fn open_trade_by_ticker(&self, ticker: &str) -> Result<Option<Trade>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM trades \
             WHERE status = 'open' AND ticker = $1 AND action = 'BUY' \
             ORDER BY created_at DESC LIMIT 1",
            TRADE_COLUMNS
        ))
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(trade_from_row).transpose()
    }

    async fn open_trades(&self) -> Result<Vec<Trade>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM trades WHERE status = 'open' ORDER BY created_at ASC",
            TRADE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM trades ORDER BY created_at DESC LIMIT $1",
            TRADE_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn total_pnl(&self) -> Result<f64, LedgerError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(pnl), 0) AS total FROM trades WHERE status = 'closed' AND action = 'SELL'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(to_f64(row.try_get("total")?))
    }

    async fn pnl_since(&self, since: DateTime<Utc>) -> Result<f64, LedgerError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(pnl), 0) AS total FROM trades \
             WHERE status = 'closed' AND action = 'SELL' AND updated_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(to_f64(row.try_get("total")?))
    }

    async fn save_analysis_log(&self, log: &AnalysisLog) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_logs (instruments_count, ai_response, decisions_json, error)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(log.instruments_count as i32)
        .bind(&log.ai_response)
        .bind(&log.decisions_json)
        .bind(&log.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_snapshots (total_rub, available_rub, positions_count, positions_json)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(to_decimal(snapshot.total_rub))
        .bind(to_decimal(snapshot.available_rub))
        .bind(snapshot.positions_count as i32)
        .bind(&snapshot.positions_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(to_f64(to_decimal(238.1)), 238.1);
        assert_eq!(to_f64(to_decimal(125.0)), 125.0);
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL pointing at a scratch Postgres
    async fn test_trade_round_trip_live() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let ledger = PostgresLedger::connect(&url).await.unwrap();

        let ticker = format!("T{}", &Uuid::new_v4().simple().to_string()[..6]);
        let mut trade = Trade::new(&ticker, TradeSide::Buy, 100.0, 10, "ord-1");
        trade.stop_loss_order_id = Some("sl-1".to_string());
        ledger.save_trade(&trade).await.unwrap();

        let open = ledger.open_trade_by_ticker(&ticker).await.unwrap().unwrap();
        assert_eq!(open.id, trade.id);
        assert_eq!(open.stop_loss_order_id.as_deref(), Some("sl-1"));

        trade.status = TradeStatus::Closed;
        trade.pnl = 125.0;
        ledger.update_trade(&trade).await.unwrap();
        assert!(ledger.open_trade_by_ticker(&ticker).await.unwrap().is_none());
    }
}
