//! External API collaborators: the assistant under test and the LLM judge.
//!
//! Both speak the OpenAI-style chat-completions wire format; the shared
//! plumbing (request/response shapes, error mapping, response size guard)
//! lives here and the two adapters stay thin.

pub mod assistant;
pub mod error;
pub mod judge;

pub use assistant::AssistantClient;
pub use error::{human_message, ClientError};
pub use judge::{auto_score_pending, AutoScoreSummary, JudgeClient, JudgeScores, ResponseJudge};

use serde::{Deserialize, Serialize};

/// Maximum allowed response content length (1MB).
pub(crate) const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters per request.
pub(crate) const MAX_INPUT_CHARS: usize = 500_000;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatApiRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ApiMessage],
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    pub role: &'static str,
    pub content: String,
}

impl ApiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatApiResponse {
    pub choices: Option<Vec<Choice>>,
    pub usage: Option<ApiUsage>,
    pub model: Option<String>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: Option<ChoiceMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    pub content: Option<String>,
    /// Present when the provider attached web-search citations.
    #[serde(default)]
    pub annotations: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: Option<String>,
    #[allow(dead_code)]
    pub code: Option<String>,
}

// =============================================================================
// Shared request path
// =============================================================================

pub(crate) fn build_http_client(
    api_key: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, ClientError> {
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ClientError::config("invalid API key format"))?;
    headers.insert(AUTHORIZATION, auth);

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .gzip(true)
        .build()
        .map_err(|e| ClientError::config(format!("failed to create HTTP client: {e}")))
}

/// POST a chat request and map transport/provider failures into
/// [`ClientError`], enforcing the response size limit as the body streams in.
pub(crate) async fn post_chat(
    client: &reqwest::Client,
    base_url: &str,
    request: &ChatApiRequest<'_>,
) -> Result<ChatApiResponse, ClientError> {
    let total_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    if total_chars > MAX_INPUT_CHARS {
        return Err(ClientError::provider(
            format!("input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"),
            false,
            None,
        ));
    }

    let url = format!("{base_url}/chat/completions");
    let mut response = client.post(url).json(request).send().await?;
    let status = response.status();

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let new_len = bytes.len() + chunk.len();
        if new_len > MAX_RESPONSE_LEN {
            return Err(ClientError::provider(
                format!("response too large: {new_len} bytes"),
                false,
                Some(status.as_u16()),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    let body = String::from_utf8_lossy(&bytes).to_string();

    if !status.is_success() {
        let message = serde_json::from_str::<ChatApiResponse>(&body)
            .ok()
            .and_then(|parsed| parsed.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        let retryable = status.as_u16() == 429 || status.as_u16() >= 500;
        return Err(ClientError::provider(message, retryable, Some(status.as_u16())));
    }

    let parsed: ChatApiResponse = serde_json::from_str(&body)
        .map_err(|e| ClientError::parse(format!("invalid JSON from provider: {e}")))?;

    if let Some(error) = &parsed.error {
        let message = error.message.clone().unwrap_or_default();
        return Err(ClientError::provider(message, false, Some(status.as_u16())));
    }

    Ok(parsed)
}

/// Extract the first choice's content, or a provider error if empty.
pub(crate) fn first_content(parsed: &ChatApiResponse) -> Result<String, ClientError> {
    let content = parsed
        .choices
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.clone())
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(ClientError::provider("no content in response", false, None));
    }
    Ok(content)
}
