//! Error types for the external API clients.

use thiserror::Error;

/// Errors surfaced by the assistant and judge clients.
///
/// The batch runner treats these opaquely (it retries on anything and records
/// the display string); `human_message` exists for the CLI to translate the
/// common provider failures into something actionable.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (missing API key, bad base URL, etc.).
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider-reported error; may be retryable.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        retryable: bool,
        http_status: Option<u16>,
    },

    /// The response body could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn provider(message: impl Into<String>, retryable: bool, http_status: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            retryable,
            http_status,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Provider { retryable, .. } => *retryable,
            Self::Parse(_) => false,
        }
    }
}

/// Translate a raw failure string into a human-readable instruction.
///
/// Substring matching on purpose: the providers' error strings are not a
/// stable contract, and the batch path only carries opaque reasons.
pub fn human_message(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("insufficient_quota") || lower.contains("quota") {
        "API quota exceeded. Check your provider billing.".to_string()
    } else if lower.contains("authentication") || lower.contains("api key") {
        "Invalid API key. Check the API key environment variable.".to_string()
    } else if lower.contains("rate_limit") || lower.contains("rate limit") {
        "Rate limit exceeded. Too many requests; wait and try again.".to_string()
    } else if lower.contains("timeout") {
        "Request timeout. Check your connection and try again.".to_string()
    } else if lower.contains("connection") || lower.contains("network") {
        "Network error. Check your connection.".to_string()
    } else if lower.contains("model") && lower.contains("not found") {
        "Invalid model specified. Check config.json for the model name.".to_string()
    } else {
        error.to_string()
    }
}
