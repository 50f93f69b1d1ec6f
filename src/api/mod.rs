pub mod moex;
pub mod news;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MarketTicker, NewsItem};

pub use moex::MoexClient;
pub use news::news_for_tickers;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange returned status {0}")]
    Status(u16),
    #[error("failed to decode exchange response: {0}")]
    Decode(String),
    #[error("unexpected table columns: {0:?}")]
    UnexpectedColumns(Vec<String>),
}

/// Exchange-wide market information
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most traded instruments of the session, highest turnover first
    async fn top_tickers(&self, limit: usize) -> Result<Vec<MarketTicker>, MarketDataError>;

    /// Exchange news from the last 24 hours
    async fn recent_news(&self) -> Result<Vec<NewsItem>, MarketDataError>;
}
