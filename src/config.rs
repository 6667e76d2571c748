//! Runtime configuration loaded from `config.json`.
//!
//! A missing file yields defaults; a malformed file is a hard error, since a
//! bad configuration is caller misuse rather than recoverable state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::RunnerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Sampling temperature for assistant calls. Ignored for search models.
    pub temperature: f32,
    pub max_tokens: u32,
    /// Fixed delay between successful batch calls, in seconds.
    pub rate_limit_delay: f64,
    /// Attempts per query before recording an item-level failure.
    pub retry_attempts: u32,
    /// Initial backoff, in seconds. Doubles per retry.
    pub retry_delay: f64,
    pub batch_size: usize,
    pub sample_size: usize,
    /// Responses required per assistant before a validation sample can be drawn.
    pub min_responses_for_sample: usize,
    pub sampler_seed: u64,
    pub assistant_a_label: String,
    pub assistant_b_label: String,
    pub assistant_a_model: String,
    /// Assistant B responses are imported manually unless a model is set.
    pub assistant_b_model: Option<String>,
    pub judge_model: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            rate_limit_delay: 1.0,
            retry_attempts: 3,
            retry_delay: 2.0,
            batch_size: 20,
            sample_size: 20,
            min_responses_for_sample: 50,
            sampler_seed: 7919,
            assistant_a_label: "Assistant A".to_string(),
            assistant_b_label: "Assistant B".to_string(),
            assistant_a_model: "gpt-4o-mini-search-preview".to_string(),
            assistant_b_model: None,
            judge_model: "gpt-4o".to_string(),
        }
    }
}

impl EvalConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.validate()?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.batch_size) {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and 100, got {}",
                self.batch_size
            )));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry_attempts must be at least 1".into()));
        }
        if self.sample_size == 0 {
            return Err(ConfigError::Invalid("sample_size must be at least 1".into()));
        }
        if self.rate_limit_delay < 0.0 || self.retry_delay < 0.0 {
            return Err(ConfigError::Invalid("delays must be non-negative".into()));
        }
        Ok(())
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_attempts: self.retry_attempts,
            retry_delay: Duration::from_secs_f64(self.retry_delay),
            rate_limit_delay: Duration::from_secs_f64(self.rate_limit_delay),
        }
    }
}
