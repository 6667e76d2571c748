//! Domain types shared across the harness.
//!
//! Everything here is persisted through [`crate::store::JsonStore`], so the
//! serde shapes double as the on-disk schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Queries
// =============================================================================

/// How well-formed a query is, as labeled in the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryQuality {
    #[serde(rename = "Well-formed")]
    WellFormed,
    #[serde(rename = "Poorly-formed")]
    PoorlyFormed,
    #[serde(rename = "Ambiguous")]
    Ambiguous,
    #[serde(rename = "Typos/Informal")]
    TyposInformal,
    #[serde(rename = "Time-sensitive ambiguous")]
    TimeSensitiveAmbiguous,
}

impl QueryQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WellFormed => "Well-formed",
            Self::PoorlyFormed => "Poorly-formed",
            Self::Ambiguous => "Ambiguous",
            Self::TyposInformal => "Typos/Informal",
            Self::TimeSensitiveAmbiguous => "Time-sensitive ambiguous",
        }
    }

    /// Hard strata get priority in the validation sample: these are the
    /// queries expected to separate the two assistants.
    pub fn is_hard(self) -> bool {
        matches!(self, Self::PoorlyFormed | Self::Ambiguous)
    }
}

/// How clear the user's intent is, as labeled in the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentClarity {
    High,
    Medium,
    Low,
    #[serde(rename = "Very Low")]
    VeryLow,
}

impl IntentClarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::VeryLow => "Very Low",
        }
    }

    pub fn is_hard(self) -> bool {
        matches!(self, Self::Low | Self::VeryLow)
    }
}

/// One query from the evaluation dataset. Immutable after load.
///
/// `category` is a dataset-defined open vocabulary, so it stays a string;
/// the sampler and breakdowns treat it as an opaque grouping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: u64,
    pub text: String,
    pub category: String,
    pub quality: QueryQuality,
    pub intent_clarity: IntentClarity,
}

// =============================================================================
// Responses
// =============================================================================

/// The two assistants under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assistant {
    A,
    B,
}

impl Assistant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "assistant_a",
            Self::B => "assistant_b",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One collected response for a (query, assistant) pair.
///
/// Written wholesale when a call succeeds; re-saving replaces the whole
/// record, individual fields are never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub web_search_used: bool,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// =============================================================================
// Scores
// =============================================================================

/// Who produced a score set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Manual,
    Automated,
}

impl ScoreSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automated => "automated",
        }
    }
}

/// Per-assistant half of a score set.
///
/// The third metric was historically persisted as `source_quality` before it
/// was renamed to `clarity`; the alias keeps old result files readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantScores {
    #[serde(default)]
    pub relevance: Option<u8>,
    #[serde(default)]
    pub completeness: Option<u8>,
    #[serde(default, alias = "source_quality")]
    pub clarity: Option<u8>,
    #[serde(default)]
    pub intent_understood: bool,
    #[serde(default)]
    pub followups_needed: bool,
}

impl AssistantScores {
    /// All three metrics present and in the 1..=5 band.
    pub fn is_complete(&self) -> bool {
        [self.relevance, self.completeness, self.clarity]
            .iter()
            .all(|m| matches!(m, Some(v) if (1..=5).contains(v)))
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        let raw = match metric {
            Metric::Relevance => self.relevance,
            Metric::Completeness => self.completeness,
            Metric::Clarity => self.clarity,
        };
        raw.map(f64::from)
    }
}

/// Scores for both assistants on one query. At most one per query; a manual
/// score set is never replaced by an automated one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSet {
    pub assistant_a: AssistantScores,
    pub assistant_b: AssistantScores,
    pub source: ScoreSource,
    #[serde(default)]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScoreSet {
    pub fn scores_for(&self, assistant: Assistant) -> &AssistantScores {
        match assistant {
            Assistant::A => &self.assistant_a,
            Assistant::B => &self.assistant_b,
        }
    }
}

/// The three 1–5 metrics every response is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Relevance,
    Completeness,
    Clarity,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Relevance, Metric::Completeness, Metric::Clarity];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Completeness => "completeness",
            Self::Clarity => "clarity",
        }
    }
}

// =============================================================================
// Per-query result + progress entries
// =============================================================================

/// The per-query value in the results dataset: both responses plus scores,
/// each filled in as the campaign progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    pub query_id: u64,
    #[serde(default)]
    pub assistant_a: Option<ResponseRecord>,
    #[serde(default)]
    pub assistant_b: Option<ResponseRecord>,
    #[serde(default)]
    pub scores: Option<ScoreSet>,
}

impl ResultEntry {
    pub fn new(query_id: u64) -> Self {
        Self {
            query_id,
            assistant_a: None,
            assistant_b: None,
            scores: None,
        }
    }

    pub fn response(&self, assistant: Assistant) -> Option<&ResponseRecord> {
        match assistant {
            Assistant::A => self.assistant_a.as_ref(),
            Assistant::B => self.assistant_b.as_ref(),
        }
    }

    pub fn response_mut(&mut self, assistant: Assistant) -> &mut Option<ResponseRecord> {
        match assistant {
            Assistant::A => &mut self.assistant_a,
            Assistant::B => &mut self.assistant_b,
        }
    }

    pub fn has_both_responses(&self) -> bool {
        self.assistant_a.is_some() && self.assistant_b.is_some()
    }

    pub fn is_fully_complete(&self) -> bool {
        self.has_both_responses() && self.scores.is_some()
    }
}

/// Cached completion flags for one query.
///
/// Purely an accelerator over the results dataset — it can always be
/// re-derived (see `ProgressTracker::rebuild_cache`) and is never consulted
/// for completion statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressEntry {
    #[serde(default)]
    pub assistant_a_done: bool,
    #[serde(default)]
    pub assistant_b_done: bool,
    #[serde(default)]
    pub scored: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProgressEntry {
    pub fn from_result(entry: &ResultEntry, now: DateTime<Utc>) -> Self {
        Self {
            assistant_a_done: entry.assistant_a.is_some(),
            assistant_b_done: entry.assistant_b.is_some(),
            scored: entry.scores.is_some(),
            last_updated: Some(now),
        }
    }
}

/// A unit of outstanding work for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AssistantA,
    AssistantB,
    Scoring,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssistantA => "assistant_a",
            Self::AssistantB => "assistant_b",
            Self::Scoring => "scoring",
        }
    }
}
