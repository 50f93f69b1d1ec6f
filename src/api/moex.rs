use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{MarketData, MarketDataError};
use crate::models::{MarketTicker, NewsItem};

pub const ISS_BASE_URL: &str = "https://iss.moex.com/iss";

const RATE_LIMIT_RPS: u32 = 5;
const NEWS_PAGE_SIZE: usize = 50;
const NEWS_MAX_PAGES: usize = 4;
const NEWS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type IssRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// ISS tables come back as column names plus positional rows
#[derive(Debug, Deserialize, Default)]
struct IssTable {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

impl IssTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize)]
struct MarketDataResponse {
    #[serde(default)]
    marketdata: IssTable,
}

#[derive(Debug, Deserialize)]
struct SiteNewsResponse {
    #[serde(default)]
    sitenews: IssTable,
}

/// Moscow Exchange ISS client (public, unauthenticated)
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct MoexClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<IssRateLimiter>,
}

impl MoexClient {
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_base_url(ISS_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, MarketDataError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, MarketDataError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| MarketDataError::Decode(e.to_string()))
    }

    /// News published after `cutoff`, newest first as ISS lists them
    pub async fn news_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<NewsItem>, MarketDataError> {
        let mut all_news = Vec::new();

        for page in 0..NEWS_MAX_PAGES {
            let url = format!(
                "{}/sitenews.json?lang=ru&start={}",
                self.base_url,
                page * NEWS_PAGE_SIZE
            );
            let resp: SiteNewsResponse = self.get_json(&url).await?;
            let table = resp.sitenews;

            let (id_idx, title_idx, pub_idx) = match (
                table.column("id"),
                table.column("title"),
                table.column("published_at"),
            ) {
                (Some(i), Some(t), Some(p)) => (i, t, p),
                _ => return Err(MarketDataError::UnexpectedColumns(table.columns.clone())),
            };

            let mut reached_cutoff = false;
            for row in &table.data {
                let Some(published) = row
                    .get(pub_idx)
                    .and_then(Value::as_str)
                    .and_then(parse_exchange_time)
                else {
                    continue;
                };

                if published < cutoff {
                    reached_cutoff = true;
                    break;
                }

                all_news.push(NewsItem {
                    id: row.get(id_idx).map(value_to_f64).unwrap_or(0.0) as i64,
                    title: row
                        .get(title_idx)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    published,
                });
            }

            if reached_cutoff || table.data.len() < NEWS_PAGE_SIZE {
                break;
            }
        }

        debug!("Fetched {} news items since {}", all_news.len(), cutoff);
        Ok(all_news)
    }
}

#[async_trait]
impl MarketData for MoexClient {
    async fn top_tickers(&self, limit: usize) -> Result<Vec<MarketTicker>, MarketDataError> {
        let url = format!(
            "{}/engines/stock/markets/shares/boards/TQBR/securities.json\
             ?iss.meta=off&iss.only=marketdata&marketdata.columns=SECID,VALTODAY,LAST\
             &sort_column=VALTODAY&sort_order=desc",
            self.base_url
        );
        let resp: MarketDataResponse = self.get_json(&url).await?;
        let table = resp.marketdata;

        let (secid, valtoday, last) = match (
            table.column("SECID"),
            table.column("VALTODAY"),
            table.column("LAST"),
        ) {
            (Some(s), Some(v), Some(l)) => (s, v, l),
            _ => return Err(MarketDataError::UnexpectedColumns(table.columns.clone())),
        };

        let mut result = Vec::new();
        for row in &table.data {
            let ticker = row.get(secid).and_then(Value::as_str).unwrap_or_default();
            if ticker.is_empty() {
                continue;
            }

            // Zero last price means trading is suspended
            let last_price = row.get(last).map(value_to_f64).unwrap_or(0.0);
            if last_price == 0.0 {
                continue;
            }

            result.push(MarketTicker {
                ticker: ticker.to_string(),
                value_today: row.get(valtoday).map(value_to_f64).unwrap_or(0.0),
                last_price,
            });

            if result.len() >= limit {
                break;
            }
        }

        Ok(result)
    }

    async fn recent_news(&self) -> Result<Vec<NewsItem>, MarketDataError> {
        self.news_since(Utc::now() - ChronoDuration::hours(24)).await
    }
}

/// ISS timestamps are exchange-local wall clock time
fn parse_exchange_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, NEWS_TIME_FORMAT).ok()?;
    chrono_tz::Europe::Moscow
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn value_to_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
