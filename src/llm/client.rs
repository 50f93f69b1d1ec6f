//! DeepSeek chat-completions client
//!
//! The API is OpenAI compatible; only the base URL and model differ.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::parser::parse_decisions;
use super::prompt::{build_user_prompt, AnalysisRequest, SYSTEM_PROMPT};
use super::{Analysis, AnalysisError, DecisionService};
use crate::config::DeepSeekConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: String,
}

pub struct DeepSeekClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl DeepSeekClient {
    pub fn new(cfg: &DeepSeekConfig) -> Self {
        let base_url = if cfg.base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            cfg.base_url.as_str()
        };

        Self {
            client: reqwest::Client::new(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
        }
    }

    async fn complete(&self, user_prompt: &str) -> Result<String, AnalysisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[async_trait]
impl DecisionService for DeepSeekClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let user_prompt = build_user_prompt(request);

        info!(
            "🤖 Sending analysis request ({} tickers, {} positions)",
            request.tickers.len(),
            request.positions.len()
        );

        let raw_response = tokio::time::timeout(self.timeout, self.complete(&user_prompt))
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))??;

        info!("Received AI response ({} bytes)", raw_response.len());
        debug!("AI raw response: {}", raw_response);

        let decisions = parse_decisions(&raw_response).map_err(|source| AnalysisError::Parse {
            source,
            raw: raw_response.clone(),
        })?;

        Ok(Analysis {
            decisions,
            raw_response,
        })
    }
}
