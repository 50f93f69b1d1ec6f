// AI decision service: prompt building, model client, response parsing
pub mod client;
pub mod parser;
pub mod prompt;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::TradeDecision;

pub use client::DeepSeekClient;
pub use parser::{parse_decisions, ParseError};
pub use prompt::{AnalysisRequest, TickerAnalysis};

/// Parsed model answer together with the text it came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub decisions: Vec<TradeDecision>,
    pub raw_response: String,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),
    #[error("AI returned no choices")]
    EmptyResponse,
    #[error("parse AI response: {source}")]
    Parse {
        #[source]
        source: ParseError,
        raw: String,
    },
}

impl AnalysisError {
    /// Model output received before the failure, if any
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AnalysisError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError>;
}
