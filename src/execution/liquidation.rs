use tracing::{error, info};

use crate::broker::Broker;
use crate::models::PositionInfo;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiquidationReport {
    pub closed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

impl LiquidationReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Market-sell every position in full
///
/// Orders are sized in lots; positions holding less than one whole lot are
/// skipped. A missing instrument id
/// is resolved from the ticker. Each failure is recorded and the rest continue.
pub async fn close_positions(broker: &dyn Broker, positions: &[PositionInfo]) -> LiquidationReport {
    let mut report = LiquidationReport::default();

    for position in positions {
        let lots = position.quantity_lots.trunc() as i64;
        if lots <= 0 {
            report.skipped.push(position.ticker.clone());
            continue;
        }

        let instrument_id = if position.instrument_id.is_empty() {
            match broker.resolve_instrument(&position.ticker).await {
                Ok(id) => id,
                Err(e) => {
                    error!(ticker = %position.ticker, "Cannot resolve instrument: {}", e);
                    report.failed.push((position.ticker.clone(), format!("resolve: {}", e)));
                    continue;
                }
            }
        } else {
            position.instrument_id.clone()
        };

        match broker.sell(&instrument_id, lots).await {
            Ok(fill) => {
                info!(
                    ticker = %position.ticker,
                    "✅ Sold {} lots @ {:.2}",
                    fill.executed_lots,
                    fill.executed_price
                );
                report.closed.push(position.ticker.clone());
            }
            Err(e) => {
                error!(ticker = %position.ticker, "❌ Sell failed: {}", e);
                report.failed.push((position.ticker.clone(), format!("sell: {}", e)));
            }
        }
    }

    report
}
