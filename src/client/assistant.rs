//! Chat client for the assistant under test.
//!
//! Produces one [`ResponseRecord`] per successful call, including response
//! latency, token usage, and whether the model reached for web search
//! (signalled by citation annotations on the message).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::runner::QueryInvoker;
use crate::types::{ResponseRecord, TokenUsage};

use super::error::ClientError;
use super::{build_http_client, post_chat, ApiMessage, ChatApiRequest, DEFAULT_BASE_URL};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Provide comprehensive, accurate answers.";

/// Rough per-token pricing for cost estimates, dollars per 1M tokens.
const INPUT_COST_PER_1M: f64 = 10.0;
const OUTPUT_COST_PER_1M: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AssistantClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(
            api_key,
            DEFAULT_BASE_URL,
            Duration::from_secs(120),
            model,
            0.7,
            2000,
        )
    }

    /// Create from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Result<Self, ClientError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClientError::config("OPENAI_API_KEY not set"))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_config(api_key, base_url, Duration::from_secs(120), model, temperature, max_tokens)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(&api_key.into(), timeout)?,
            base_url: base_url.into(),
            model: model.into(),
            temperature,
            max_tokens,
        })
    }

    /// Search-enabled model variants reject the temperature parameter and
    /// take a web_search_options block instead.
    fn is_search_model(&self) -> bool {
        self.model.to_lowercase().contains("search")
    }

    /// Send one query and build its response record.
    pub async fn query(&self, query_text: &str) -> Result<ResponseRecord, ClientError> {
        let start = Instant::now();

        let messages = [ApiMessage::system(SYSTEM_PROMPT), ApiMessage::user(query_text)];
        let request = ChatApiRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: self.max_tokens,
            temperature: if self.is_search_model() {
                None
            } else {
                Some(self.temperature)
            },
            web_search_options: if self.is_search_model() {
                Some(serde_json::json!({}))
            } else {
                None
            },
        };

        let parsed = post_chat(&self.client, &self.base_url, &request).await?;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let choice = parsed
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| ClientError::provider("no choices in response", false, None))?;
        let message = choice
            .message
            .as_ref()
            .ok_or_else(|| ClientError::provider("no message in response", false, None))?;
        let text = message.content.clone().unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ClientError::provider("empty response content", false, None));
        }

        let citation_count = message
            .annotations
            .as_ref()
            .map(|a| a.len() as u32)
            .unwrap_or(0);

        let token_usage = parsed.usage.as_ref().map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens.unwrap_or(0),
            completion_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens.unwrap_or(0) + u.completion_tokens.unwrap_or(0)),
        });

        Ok(ResponseRecord {
            text,
            timestamp: Utc::now(),
            response_time_ms: Some((response_time_ms * 100.0).round() / 100.0),
            token_usage,
            web_search_used: citation_count > 0,
            citation_count,
            model: parsed.model.clone().or_else(|| Some(self.model.clone())),
            finish_reason: choice.finish_reason.clone(),
        })
    }

    /// Rough cost/time estimate for a batch of `num_queries` calls.
    pub fn estimate_cost(&self, num_queries: usize, avg_tokens_per_query: usize) -> CostEstimate {
        let total_tokens = num_queries * avg_tokens_per_query;
        // Prompts run shorter than responses for open-ended queries.
        let input_tokens = total_tokens as f64 * 0.4;
        let output_tokens = total_tokens as f64 * 0.6;

        let cost = input_tokens / 1_000_000.0 * INPUT_COST_PER_1M
            + output_tokens / 1_000_000.0 * OUTPUT_COST_PER_1M;

        // ~2s per call plus the pacing delay.
        let time_minutes = num_queries as f64 * 3.0 / 60.0;

        CostEstimate {
            num_queries,
            estimated_total_tokens: total_tokens,
            estimated_cost_usd: (cost * 100.0).round() / 100.0,
            estimated_time_minutes: (time_minutes * 10.0).round() / 10.0,
            model: self.model.clone(),
        }
    }
}

#[async_trait]
impl QueryInvoker for AssistantClient {
    async fn invoke(&self, query_text: &str) -> Result<ResponseRecord, ClientError> {
        self.query(query_text).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub num_queries: usize,
    pub estimated_total_tokens: usize,
    pub estimated_cost_usd: f64,
    pub estimated_time_minutes: f64,
    pub model: String,
}
