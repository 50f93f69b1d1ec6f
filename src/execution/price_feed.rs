use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::broker::{Broker, BrokerError};
use crate::models::{Candle, InstrumentSnapshot};

pub const DEFAULT_CONCURRENCY: usize = 10;
const HISTORY_DAYS: i64 = 7;

/// Fetch hourly history for each ticker and derive a snapshot
///
/// At most `concurrency` tickers are in flight at once (non-positive means the
/// default). Tickers whose instrument lookup or candle request fails are
/// logged and left out. Result order is unspecified.
pub async fn fetch_snapshots(
    broker: Arc<dyn Broker>,
    tickers: &[String],
    concurrency: i64,
    now: DateTime<Utc>,
) -> Vec<InstrumentSnapshot> {
    let limit = if concurrency <= 0 {
        DEFAULT_CONCURRENCY
    } else {
        concurrency.min(Semaphore::MAX_PERMITS as i64) as usize
    };

    let semaphore = Arc::new(Semaphore::new(limit));
    let results = Arc::new(Mutex::new(Vec::with_capacity(tickers.len())));
    let mut handles = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let broker = broker.clone();
        let results = results.clone();
        let ticker = ticker.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            match fetch_one(broker.as_ref(), &ticker, now).await {
                Ok(snapshot) => results.lock().await.push(snapshot),
                Err(e) => tracing::error!(ticker = %ticker, "Failed to fetch candles: {}", e),
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Snapshot task aborted: {}", e);
        }
    }

    let mut guard = results.lock().await;
    std::mem::take(&mut *guard)
}

async fn fetch_one(
    broker: &dyn Broker,
    ticker: &str,
    now: DateTime<Utc>,
) -> Result<InstrumentSnapshot, BrokerError> {
    let instrument_id = broker.resolve_instrument(ticker).await?;
    let candles = broker
        .hourly_candles(&instrument_id, now - Duration::days(HISTORY_DAYS), now)
        .await?;

    if candles.is_empty() {
        tracing::debug!(ticker = %ticker, "No candles in window");
    }

    Ok(build_snapshot(ticker, &instrument_id, &candles, now))
}

/// Derive a snapshot from hourly bars; an empty slice gives zero prices
pub fn build_snapshot(
    ticker: &str,
    instrument_id: &str,
    candles: &[Candle],
    now: DateTime<Utc>,
) -> InstrumentSnapshot {
    InstrumentSnapshot {
        ticker: ticker.to_string(),
        instrument_id: instrument_id.to_string(),
        last_price: close_at_offset(candles, now, Duration::zero()),
        price_3h_ago: close_at_offset(candles, now, Duration::hours(3)),
        price_1d_ago: close_at_offset(candles, now, Duration::days(1)),
        price_3d_ago: close_at_offset(candles, now, Duration::days(3)),
        price_1w_ago: close_at_offset(candles, now, Duration::days(7)),
        volume_24h: volume_24h(candles, now),
    }
}

/// Close of the bar nearest to `now - offset`; ties keep the earlier bar in the slice
pub fn close_at_offset(candles: &[Candle], now: DateTime<Utc>, offset: Duration) -> f64 {
    let target = now - offset;
    let mut best: Option<(&Candle, Duration)> = None;

    for candle in candles {
        let delta = candle.timestamp - target;
        let diff = if delta < Duration::zero() { -delta } else { delta };
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((candle, diff)),
        }
    }

    best.map(|(c, _)| c.close).unwrap_or(0.0)
}

/// Volume of bars stamped strictly after `now - 24h`
pub fn volume_24h(candles: &[Candle], now: DateTime<Utc>) -> f64 {
    let cutoff = now - Duration::hours(24);
    candles
        .iter()
        .filter(|c| c.timestamp > cutoff)
        .map(|c| c.volume)
        .sum()
}
