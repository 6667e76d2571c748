//! LLM-as-judge client and the auto-scoring driver.
//!
//! The judge scores one response at a time on the five criteria and returns a
//! small JSON object. Models wrap that JSON in markdown fences or prose often
//! enough that extraction has to tolerate both. Older judge prompts emitted
//! the clarity metric under the key `source_quality`; both keys are accepted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use crate::store::{JsonStore, StoreError};
use crate::tracker::ProgressTracker;
use crate::types::{AssistantScores, Query, ScoreSet, ScoreSource};

use super::error::ClientError;
use super::{build_http_client, first_content, post_chat, ApiMessage, ChatApiRequest, DEFAULT_BASE_URL};

const JUDGE_SYSTEM_PROMPT: &str = "You are an objective expert evaluator of AI assistant responses. \
     Provide fair, unbiased assessments based on the given criteria.";

/// Low temperature for consistent scoring.
const JUDGE_TEMPERATURE: f32 = 0.3;
const JUDGE_MAX_TOKENS: u32 = 500;

/// Judge pricing for estimates, dollars per 1M tokens.
const INPUT_COST_PER_1M: f64 = 2.5;
const OUTPUT_COST_PER_1M: f64 = 10.0;

// =============================================================================
// Collaborator contract
// =============================================================================

/// One judged response. All metrics validated into 1..=5 before this exists.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeScores {
    pub relevance: u8,
    pub completeness: u8,
    pub clarity: u8,
    pub intent_understood: bool,
    pub followups_needed: bool,
    pub reasoning: String,
}

impl JudgeScores {
    pub fn to_assistant_scores(&self) -> AssistantScores {
        AssistantScores {
            relevance: Some(self.relevance),
            completeness: Some(self.completeness),
            clarity: Some(self.clarity),
            intent_understood: self.intent_understood,
            followups_needed: self.followups_needed,
        }
    }
}

/// Scoring collaborator. A failed evaluation is an error the caller absorbs;
/// the auto-scoring driver skips that query and keeps going.
#[async_trait]
pub trait ResponseJudge: Send + Sync {
    async fn evaluate(&self, query: &Query, response_text: &str)
        -> Result<JudgeScores, ClientError>;
}

// =============================================================================
// HTTP judge
// =============================================================================

#[derive(Debug, Clone)]
pub struct JudgeClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl JudgeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(120), model)
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ClientError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClientError::config("OPENAI_API_KEY not set"))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::with_config(api_key, base_url, Duration::from_secs(120), model)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        model: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(&api_key.into(), timeout)?,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Judge pricing estimate: two evaluations per query pair.
    pub fn estimate_cost(&self, num_queries: usize) -> JudgeCostEstimate {
        let evaluations = num_queries * 2;
        let input_tokens = evaluations as f64 * 400.0;
        let output_tokens = evaluations as f64 * 150.0;
        let cost = input_tokens / 1_000_000.0 * INPUT_COST_PER_1M
            + output_tokens / 1_000_000.0 * OUTPUT_COST_PER_1M;

        JudgeCostEstimate {
            num_queries,
            total_evaluations: evaluations,
            estimated_total_tokens: (input_tokens + output_tokens) as usize,
            estimated_cost_usd: (cost * 100.0).round() / 100.0,
            estimated_time_minutes: ((evaluations as f64 * 2.0 / 60.0) * 10.0).round() / 10.0,
            model: self.model.clone(),
        }
    }
}

#[async_trait]
impl ResponseJudge for JudgeClient {
    async fn evaluate(
        &self,
        query: &Query,
        response_text: &str,
    ) -> Result<JudgeScores, ClientError> {
        let prompt = evaluation_prompt(query, response_text);
        let messages = [ApiMessage::system(JUDGE_SYSTEM_PROMPT), ApiMessage::user(prompt)];
        let request = ChatApiRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: JUDGE_MAX_TOKENS,
            temperature: Some(JUDGE_TEMPERATURE),
            web_search_options: None,
        };

        let parsed = post_chat(&self.client, &self.base_url, &request).await?;
        let content = first_content(&parsed)?;
        parse_judge_response(&content)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct JudgeCostEstimate {
    pub num_queries: usize,
    pub total_evaluations: usize,
    pub estimated_total_tokens: usize,
    pub estimated_cost_usd: f64,
    pub estimated_time_minutes: f64,
    pub model: String,
}

fn evaluation_prompt(query: &Query, response_text: &str) -> String {
    format!(
        "You are an expert evaluator of AI assistant responses. Evaluate the following response on these criteria:\n\n\
         **Original Query:** {query}\n\n\
         **Query Metadata:**\n\
         - Category: {category}\n\
         - Query Quality: {quality}\n\
         - Intent Clarity: {clarity}\n\n\
         **Response to Evaluate:**\n{response}\n\n\
         ---\n\n\
         **Evaluation Criteria:**\n\n\
         1. **Relevance (1-5):** How well does the response address the query?\n\
         2. **Completeness (1-5):** How thorough and complete is the answer?\n\
         3. **Clarity (1-5):** How clear, well-structured, and easy to understand is the response?\n\
         4. **Intent Understood (true/false):** Did the AI correctly understand what the user was asking for?\n\
         5. **Follow-ups Needed (true/false):** Would the user likely need follow-up questions to get a satisfactory answer?\n\n\
         **Response Format:**\n\
         Return ONLY a JSON object with your evaluation:\n\
         {{\n\
           \"relevance\": <1-5>,\n\
           \"completeness\": <1-5>,\n\
           \"clarity\": <1-5>,\n\
           \"intent_understood\": <true/false>,\n\
           \"followups_needed\": <true/false>,\n\
           \"reasoning\": \"<brief 1-2 sentence explanation>\"\n\
         }}",
        query = query.text,
        category = query.category,
        quality = query.quality.as_str(),
        clarity = query.intent_clarity.as_str(),
        response = response_text,
    )
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct JudgeEvalJson {
    #[serde(default)]
    relevance: Option<u8>,
    #[serde(default)]
    completeness: Option<u8>,
    #[serde(default)]
    clarity: Option<u8>,
    /// Legacy key for the clarity metric.
    #[serde(default)]
    source_quality: Option<u8>,
    #[serde(default)]
    intent_understood: Option<bool>,
    #[serde(default)]
    followups_needed: Option<bool>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse the judge's reply into scores, tolerating markdown fences and
/// surrounding prose.
pub fn parse_judge_response(raw: &str) -> Result<JudgeScores, ClientError> {
    let stripped = strip_code_fences(raw);
    let json_str = extract_json(stripped);

    let parsed: JudgeEvalJson =
        serde_json::from_str(json_str).map_err(|e| ClientError::parse(e.to_string()))?;

    let clarity = parsed
        .clarity
        .or(parsed.source_quality)
        .ok_or_else(|| ClientError::parse("missing 'clarity'".to_string()))?;
    let relevance = parsed
        .relevance
        .ok_or_else(|| ClientError::parse("missing 'relevance'".to_string()))?;
    let completeness = parsed
        .completeness
        .ok_or_else(|| ClientError::parse("missing 'completeness'".to_string()))?;

    for (name, value) in [
        ("relevance", relevance),
        ("completeness", completeness),
        ("clarity", clarity),
    ] {
        if !(1..=5).contains(&value) {
            return Err(ClientError::parse(format!(
                "{name} out of allowed range [1,5]: {value}"
            )));
        }
    }

    Ok(JudgeScores {
        relevance,
        completeness,
        clarity,
        intent_understood: parsed.intent_understood.unwrap_or(false),
        followups_needed: parsed.followups_needed.unwrap_or(false),
        reasoning: parsed.reasoning.unwrap_or_default(),
    })
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    for fence in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
            return rest.trim();
        }
    }
    trimmed
}

/// Extract the first balanced JSON object from a response that may carry
/// surrounding text.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        let mut depth = 0;
        for (i, c) in remainder.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return &remainder[..=i];
                    }
                }
                _ => {}
            }
        }
    }
    trimmed
}

// =============================================================================
// Auto-scoring driver
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct AutoScoreSummary {
    pub scored: usize,
    pub skipped: usize,
    /// First few failure reasons, for the status surface.
    pub errors: Vec<String>,
}

const ERRORS_KEPT: usize = 5;

/// Score every query that has both responses and no score set yet.
///
/// Judge failures on a query are absorbed: the query is skipped and the run
/// continues. Manual scores are never touched — the scoring queue already
/// excludes scored queries, and the store rejects automated-over-manual
/// writes besides.
pub async fn auto_score_pending(
    store: &JsonStore,
    judge: &dyn ResponseJudge,
    limit: Option<usize>,
) -> Result<AutoScoreSummary, StoreError> {
    let tracker = ProgressTracker::new(store.clone());
    let items = tracker.scoring_items(limit)?;

    let mut summary = AutoScoreSummary::default();
    for item in items {
        let a = judge.evaluate(&item.query, &item.response_a.text).await;
        let b = judge.evaluate(&item.query, &item.response_b.text).await;

        let (a, b) = match (a, b) {
            (Ok(a), Ok(b)) => (a, b),
            (a, b) => {
                let reason = [a.err(), b.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(query_id = item.query.id, error = %reason, "judge evaluation failed; skipping");
                summary.skipped += 1;
                if summary.errors.len() < ERRORS_KEPT {
                    summary.errors.push(format!("query {}: {reason}", item.query.id));
                }
                continue;
            }
        };

        let scores = ScoreSet {
            assistant_a: a.to_assistant_scores(),
            assistant_b: b.to_assistant_scores(),
            source: ScoreSource::Automated,
            notes: Some(format!("A: {} | B: {}", a.reasoning, b.reasoning)),
            timestamp: Utc::now(),
        };

        match store.save_scores(item.query.id, scores) {
            Ok(()) => summary.scored += 1,
            Err(StoreError::ManualScoresProtected(id)) => {
                warn!(query_id = id, "manual scores already present; skipping");
                summary.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(summary)
}
