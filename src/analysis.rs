//! Paired statistical comparison over fully-scored queries.
//!
//! Scored queries are materialized into flat rows (one per query), then
//! summarised per assistant, tested pairwise per metric, and broken down by
//! the dataset dimensions. Partial campaigns are the normal case: every
//! function degrades to a structured insufficient/empty result instead of
//! failing when data is missing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::store::{JsonStore, StoreError};
use crate::types::{Assistant, Metric};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no scored queries available")]
    NoScoredQueries,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Display names for the two assistants, used in insights and reports.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantLabels {
    pub a: String,
    pub b: String,
}

impl Default for AssistantLabels {
    fn default() -> Self {
        Self {
            a: "Assistant A".to_string(),
            b: "Assistant B".to_string(),
        }
    }
}

impl AssistantLabels {
    fn name(&self, assistant: Assistant) -> &str {
        match assistant {
            Assistant::A => &self.a,
            Assistant::B => &self.b,
        }
    }
}

// =============================================================================
// Flat rows
// =============================================================================

/// One scored query, flattened for analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub query_id: u64,
    pub category: String,
    pub quality: String,
    pub intent_clarity: String,
    pub a_relevance: Option<f64>,
    pub a_completeness: Option<f64>,
    pub a_clarity: Option<f64>,
    pub a_intent_understood: bool,
    pub a_followups_needed: bool,
    pub b_relevance: Option<f64>,
    pub b_completeness: Option<f64>,
    pub b_clarity: Option<f64>,
    pub b_intent_understood: bool,
    pub b_followups_needed: bool,
    pub a_response_time_ms: Option<f64>,
    pub b_response_time_ms: Option<f64>,
    /// Web-assisted retrieval is only instrumented on assistant A.
    pub a_web_search_used: bool,
    pub a_citation_count: u32,
}

impl AnalysisRow {
    pub fn metric(&self, assistant: Assistant, metric: Metric) -> Option<f64> {
        match (assistant, metric) {
            (Assistant::A, Metric::Relevance) => self.a_relevance,
            (Assistant::A, Metric::Completeness) => self.a_completeness,
            (Assistant::A, Metric::Clarity) => self.a_clarity,
            (Assistant::B, Metric::Relevance) => self.b_relevance,
            (Assistant::B, Metric::Completeness) => self.b_completeness,
            (Assistant::B, Metric::Clarity) => self.b_clarity,
        }
    }

    fn intent_understood(&self, assistant: Assistant) -> bool {
        match assistant {
            Assistant::A => self.a_intent_understood,
            Assistant::B => self.b_intent_understood,
        }
    }

    fn followups_needed(&self, assistant: Assistant) -> bool {
        match assistant {
            Assistant::A => self.a_followups_needed,
            Assistant::B => self.b_followups_needed,
        }
    }
}

/// Grouping dimensions for categorical breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Category,
    Quality,
    IntentClarity,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Quality => "quality",
            Self::IntentClarity => "intent_clarity",
        }
    }

    fn value<'a>(self, row: &'a AnalysisRow) -> &'a str {
        match self {
            Self::Category => &row.category,
            Self::Quality => &row.quality,
            Self::IntentClarity => &row.intent_clarity,
        }
    }

    /// Intent-understanding rates are reported for the difficulty-oriented
    /// groupings, not for topical categories.
    fn includes_intent_rate(self) -> bool {
        matches!(self, Self::Quality | Self::IntentClarity)
    }
}

// =============================================================================
// Result shapes
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantSummary {
    /// Per-metric descriptive stats over non-missing values; metrics with no
    /// values at all are omitted.
    pub metrics: BTreeMap<String, MetricSummary>,
    /// Fraction of queries with intent understood, as a percentage.
    pub intent_understanding_rate: f64,
    pub avg_followups: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStatistics {
    pub total_queries: usize,
    pub assistant_a: AssistantSummary,
    pub assistant_b: AssistantSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn classify(cohens_d: f64) -> Self {
        let d = cohens_d.abs();
        if d < 0.2 {
            Self::Negligible
        } else if d < 0.5 {
            Self::Small
        } else if d < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negligible => "negligible",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairedTestResult {
    pub metric: String,
    pub n: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    /// `mean_b - mean_a`: positive favors assistant B.
    pub difference: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    /// `mean(a - b) / std(a - b)` for paired data.
    pub cohens_d: f64,
    pub effect_size: EffectSize,
}

/// Paired t-test outcome; fewer than two complete pairs is reported, not
/// raised.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairedTest {
    Insufficient { n: usize },
    Computed(PairedTestResult),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupAssistantStats {
    /// Per-metric means over non-missing values; empty metrics omitted.
    pub metrics: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub count: usize,
    pub assistant_a: GroupAssistantStats,
    pub assistant_b: GroupAssistantStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDelta {
    pub difference: f64,
    pub percent_change: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchGroup {
    pub count: usize,
    pub assistant_a: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_rate: Option<f64>,
    /// Assistant B means over the same rows, for side-by-side reading; only
    /// populated for the web-search group.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub assistant_b: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchImpact {
    pub with_search: SearchGroup,
    pub without_search: SearchGroup,
    /// Per-metric with-vs-without deltas; empty unless both groups have rows.
    pub comparison: BTreeMap<String, MetricDelta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    pub total_queries: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullAnalysis {
    pub metadata: AnalysisMetadata,
    pub summary: SummaryStatistics,
    pub tests: BTreeMap<String, PairedTest>,
    pub by_category: BTreeMap<String, GroupStats>,
    pub by_quality: BTreeMap<String, GroupStats>,
    pub by_intent_clarity: BTreeMap<String, GroupStats>,
    pub web_search: WebSearchImpact,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    rows: Vec<AnalysisRow>,
    labels: AssistantLabels,
}

impl ComparisonEngine {
    /// Join queries with their results, keeping only rows with a score set
    /// (manual or automated).
    pub fn from_store(store: &JsonStore, labels: AssistantLabels) -> Result<Self, AnalysisError> {
        let queries = store.load_queries()?;
        let results = store.load_results()?;

        let mut rows = Vec::new();
        for query in queries {
            let Some(entry) = results.get(&query.id) else {
                continue;
            };
            let Some(scores) = &entry.scores else {
                continue;
            };
            let a = scores.scores_for(Assistant::A);
            let b = scores.scores_for(Assistant::B);
            rows.push(AnalysisRow {
                query_id: query.id,
                category: query.category.clone(),
                quality: query.quality.as_str().to_string(),
                intent_clarity: query.intent_clarity.as_str().to_string(),
                a_relevance: a.metric(Metric::Relevance),
                a_completeness: a.metric(Metric::Completeness),
                a_clarity: a.metric(Metric::Clarity),
                a_intent_understood: a.intent_understood,
                a_followups_needed: a.followups_needed,
                b_relevance: b.metric(Metric::Relevance),
                b_completeness: b.metric(Metric::Completeness),
                b_clarity: b.metric(Metric::Clarity),
                b_intent_understood: b.intent_understood,
                b_followups_needed: b.followups_needed,
                a_response_time_ms: entry.assistant_a.as_ref().and_then(|r| r.response_time_ms),
                b_response_time_ms: entry.assistant_b.as_ref().and_then(|r| r.response_time_ms),
                a_web_search_used: entry
                    .assistant_a
                    .as_ref()
                    .map(|r| r.web_search_used)
                    .unwrap_or(false),
                a_citation_count: entry
                    .assistant_a
                    .as_ref()
                    .map(|r| r.citation_count)
                    .unwrap_or(0),
            });
        }

        Ok(Self { rows, labels })
    }

    pub fn from_rows(rows: Vec<AnalysisRow>, labels: AssistantLabels) -> Self {
        Self { rows, labels }
    }

    pub fn rows(&self) -> &[AnalysisRow] {
        &self.rows
    }

    pub fn summary_statistics(&self) -> SummaryStatistics {
        SummaryStatistics {
            total_queries: self.rows.len(),
            assistant_a: self.assistant_summary(Assistant::A),
            assistant_b: self.assistant_summary(Assistant::B),
        }
    }

    fn assistant_summary(&self, assistant: Assistant) -> AssistantSummary {
        let mut metrics = BTreeMap::new();
        for metric in Metric::ALL {
            let values: Vec<f64> = self
                .rows
                .iter()
                .filter_map(|r| r.metric(assistant, metric))
                .collect();
            if values.is_empty() {
                continue;
            }
            metrics.insert(
                metric.as_str().to_string(),
                MetricSummary {
                    mean: round2(mean(&values)),
                    median: round2(median(&values)),
                    std: round2(sample_std(&values)),
                    min: round2(values.iter().cloned().fold(f64::INFINITY, f64::min)),
                    max: round2(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                },
            );
        }

        let n = self.rows.len();
        let intent_rate = if n > 0 {
            let understood = self
                .rows
                .iter()
                .filter(|r| r.intent_understood(assistant))
                .count();
            round1(understood as f64 / n as f64 * 100.0)
        } else {
            0.0
        };
        let avg_followups = if n > 0 {
            let followups: Vec<f64> = self
                .rows
                .iter()
                .map(|r| if r.followups_needed(assistant) { 1.0 } else { 0.0 })
                .collect();
            round2(mean(&followups))
        } else {
            0.0
        };

        AssistantSummary {
            metrics,
            intent_understanding_rate: intent_rate,
            avg_followups,
        }
    }

    /// Paired t-test for `metric` over rows where both assistants have a
    /// value, with Cohen's d for paired data.
    pub fn paired_significance_test(&self, metric: Metric) -> PairedTest {
        let pairs: Vec<(f64, f64)> = self
            .rows
            .iter()
            .filter_map(|r| {
                match (r.metric(Assistant::A, metric), r.metric(Assistant::B, metric)) {
                    (Some(a), Some(b)) => Some((a, b)),
                    _ => None,
                }
            })
            .collect();

        let n = pairs.len();
        if n < 2 {
            return PairedTest::Insufficient { n };
        }

        let a_values: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let b_values: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let diffs: Vec<f64> = pairs.iter().map(|p| p.0 - p.1).collect();

        let mean_d = mean(&diffs);
        let sd = sample_std(&diffs);

        let (t, p, d) = if mean_d == 0.0 && sd == 0.0 {
            // Identical paired vectors: no evidence of any difference.
            (0.0, 1.0, 0.0)
        } else {
            // Floor the spread so a constant nonzero difference yields a huge
            // finite statistic rather than a non-finite one.
            let sd = sd.max(1e-12);
            let t = mean_d / (sd / (n as f64).sqrt());
            let p = two_sided_p(t, (n - 1) as f64);
            (t, p, mean_d / sd)
        };

        let mean_a = mean(&a_values);
        let mean_b = mean(&b_values);

        PairedTest::Computed(PairedTestResult {
            metric: metric.as_str().to_string(),
            n,
            mean_a: round2(mean_a),
            mean_b: round2(mean_b),
            difference: round2(mean_b - mean_a),
            t_statistic: round3(t),
            p_value: round4(p),
            significant: p < 0.05,
            cohens_d: round3(d),
            effect_size: EffectSize::classify(d),
        })
    }

    /// Group rows by a dimension and report count plus per-assistant metric
    /// means. Metrics with no non-missing values in a group are omitted.
    pub fn breakdown_by(&self, dimension: Dimension) -> BTreeMap<String, GroupStats> {
        let mut groups: BTreeMap<String, Vec<&AnalysisRow>> = BTreeMap::new();
        for row in &self.rows {
            groups
                .entry(dimension.value(row).to_string())
                .or_default()
                .push(row);
        }

        groups
            .into_iter()
            .map(|(key, rows)| {
                let stats = GroupStats {
                    count: rows.len(),
                    assistant_a: group_assistant_stats(&rows, Assistant::A, dimension),
                    assistant_b: group_assistant_stats(&rows, Assistant::B, dimension),
                };
                (key, stats)
            })
            .collect()
    }

    /// Split assistant A's rows by web-search usage and compare per-metric
    /// means. The comparison section is only populated when both groups are
    /// non-empty.
    pub fn web_search_impact(&self) -> WebSearchImpact {
        let with_rows: Vec<&AnalysisRow> =
            self.rows.iter().filter(|r| r.a_web_search_used).collect();
        let without_rows: Vec<&AnalysisRow> =
            self.rows.iter().filter(|r| !r.a_web_search_used).collect();

        let mut with_search = search_group(&with_rows, Assistant::A);
        with_search.assistant_b = metric_means(&with_rows, Assistant::B);
        let without_search = search_group(&without_rows, Assistant::A);

        let mut comparison = BTreeMap::new();
        if !with_rows.is_empty() && !without_rows.is_empty() {
            for metric in Metric::ALL {
                let key = metric.as_str();
                if let (Some(w), Some(wo)) = (
                    with_search.assistant_a.get(key),
                    without_search.assistant_a.get(key),
                ) {
                    if *wo != 0.0 {
                        comparison.insert(
                            key.to_string(),
                            MetricDelta {
                                difference: round2(w - wo),
                                percent_change: round1((w - wo) / wo * 100.0),
                            },
                        );
                    }
                }
            }
        }

        WebSearchImpact {
            with_search,
            without_search,
            comparison,
        }
    }

    /// Everything at once, for the CLI and report renderer.
    pub fn full_analysis(&self) -> Result<FullAnalysis, AnalysisError> {
        if self.rows.is_empty() {
            return Err(AnalysisError::NoScoredQueries);
        }

        let mut tests = BTreeMap::new();
        for metric in Metric::ALL {
            tests.insert(
                metric.as_str().to_string(),
                self.paired_significance_test(metric),
            );
        }

        Ok(FullAnalysis {
            metadata: AnalysisMetadata {
                total_queries: self.rows.len(),
                generated_at: Utc::now(),
            },
            summary: self.summary_statistics(),
            tests,
            by_category: self.breakdown_by(Dimension::Category),
            by_quality: self.breakdown_by(Dimension::Quality),
            by_intent_clarity: self.breakdown_by(Dimension::IntentClarity),
            web_search: self.web_search_impact(),
        })
    }

    /// Short natural-language findings. A pure function of the analysis
    /// structure: same input, same insights.
    pub fn generate_insights(&self, analysis: &FullAnalysis) -> Vec<String> {
        let mut insights = Vec::new();
        let labels = &self.labels;

        // Overall winner on the average of metric means.
        let overall = |summary: &AssistantSummary| -> f64 {
            let means: Vec<f64> = Metric::ALL
                .iter()
                .filter_map(|m| summary.metrics.get(m.as_str()).map(|s| s.mean))
                .collect();
            if means.is_empty() {
                0.0
            } else {
                mean(&means)
            }
        };
        let a_avg = overall(&analysis.summary.assistant_a);
        let b_avg = overall(&analysis.summary.assistant_b);
        let winner = if b_avg > a_avg { Assistant::B } else { Assistant::A };
        insights.push(format!(
            "{} has higher overall average scores (+{:.2} points)",
            labels.name(winner),
            (b_avg - a_avg).abs()
        ));

        // Metrics reaching significance, with direction and effect size.
        for test in analysis.tests.values() {
            if let PairedTest::Computed(result) = test {
                if result.significant {
                    let winner = if result.difference > 0.0 {
                        Assistant::B
                    } else {
                        Assistant::A
                    };
                    insights.push(format!(
                        "{} significantly outperforms on {} (p={:.4}, effect size: {})",
                        labels.name(winner),
                        result.metric,
                        result.p_value,
                        result.effect_size.as_str()
                    ));
                }
            }
        }

        // Intent-understanding gap beyond 5 points.
        let a_intent = analysis.summary.assistant_a.intent_understanding_rate;
        let b_intent = analysis.summary.assistant_b.intent_understanding_rate;
        if (b_intent - a_intent).abs() > 5.0 {
            let winner = if b_intent > a_intent { Assistant::B } else { Assistant::A };
            insights.push(format!(
                "{} better understands user intent ({:.1}% vs {:.1}%)",
                labels.name(winner),
                b_intent.max(a_intent),
                b_intent.min(a_intent)
            ));
        }

        // Difficult-query gap: average across metrics on poorly-formed rows.
        if let Some(group) = analysis.by_quality.get("Poorly-formed") {
            let avg = |stats: &GroupAssistantStats| -> Option<f64> {
                if stats.metrics.is_empty() {
                    None
                } else {
                    let values: Vec<f64> = stats.metrics.values().cloned().collect();
                    Some(mean(&values))
                }
            };
            if let (Some(a_poor), Some(b_poor)) =
                (avg(&group.assistant_a), avg(&group.assistant_b))
            {
                if (b_poor - a_poor).abs() > 0.3 {
                    let winner = if b_poor > a_poor { Assistant::B } else { Assistant::A };
                    insights.push(format!(
                        "{} handles poorly-formed queries better ({:.2} vs {:.2} average across metrics)",
                        labels.name(winner),
                        b_poor.max(a_poor),
                        b_poor.min(a_poor)
                    ));
                }
            }
        }

        insights
    }
}

fn group_assistant_stats(
    rows: &[&AnalysisRow],
    assistant: Assistant,
    dimension: Dimension,
) -> GroupAssistantStats {
    let intent_rate = if dimension.includes_intent_rate() && !rows.is_empty() {
        let understood = rows.iter().filter(|r| r.intent_understood(assistant)).count();
        Some(round1(understood as f64 / rows.len() as f64 * 100.0))
    } else {
        None
    };
    GroupAssistantStats {
        metrics: metric_means(rows, assistant),
        intent_rate,
    }
}

fn metric_means(rows: &[&AnalysisRow], assistant: Assistant) -> BTreeMap<String, f64> {
    let mut means = BTreeMap::new();
    for metric in Metric::ALL {
        let values: Vec<f64> = rows.iter().filter_map(|r| r.metric(assistant, metric)).collect();
        if !values.is_empty() {
            means.insert(metric.as_str().to_string(), round2(mean(&values)));
        }
    }
    means
}

fn search_group(rows: &[&AnalysisRow], assistant: Assistant) -> SearchGroup {
    let intent_rate = if rows.is_empty() {
        None
    } else {
        let understood = rows.iter().filter(|r| r.intent_understood(assistant)).count();
        Some(round1(understood as f64 / rows.len() as f64 * 100.0))
    };
    SearchGroup {
        count: rows.len(),
        assistant_a: metric_means(rows, assistant),
        intent_rate,
        assistant_b: BTreeMap::new(),
    }
}

// =============================================================================
// Numeric helpers
// =============================================================================

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation (n-1 denominator). Zero for fewer than two
/// values, which keeps every reported number finite.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn two_sided_p(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, a: f64, b: f64) -> AnalysisRow {
        AnalysisRow {
            query_id: id,
            category: "General".to_string(),
            quality: "Well-formed".to_string(),
            intent_clarity: "High".to_string(),
            a_relevance: Some(a),
            a_completeness: Some(a),
            a_clarity: Some(a),
            a_intent_understood: true,
            a_followups_needed: false,
            b_relevance: Some(b),
            b_completeness: Some(b),
            b_clarity: Some(b),
            b_intent_understood: true,
            b_followups_needed: false,
            a_response_time_ms: None,
            b_response_time_ms: None,
            a_web_search_used: false,
            a_citation_count: 0,
        }
    }

    #[test]
    fn median_and_std_match_hand_counts() {
        assert_eq!(median(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        let std = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - 2.138).abs() < 0.001);
        assert_eq!(sample_std(&[3.0]), 0.0);
    }

    #[test]
    fn identical_paired_vectors_yield_p_one_and_negligible_effect() {
        let rows = vec![row(0, 4.0, 4.0), row(1, 3.0, 3.0), row(2, 5.0, 5.0)];
        let engine = ComparisonEngine::from_rows(rows, AssistantLabels::default());

        match engine.paired_significance_test(Metric::Relevance) {
            PairedTest::Computed(result) => {
                assert_eq!(result.p_value, 1.0);
                assert_eq!(result.cohens_d, 0.0);
                assert_eq!(result.effect_size, EffectSize::Negligible);
                assert!(!result.significant);
            }
            PairedTest::Insufficient { .. } => panic!("expected a computed test"),
        }
    }

    #[test]
    fn single_pair_is_insufficient() {
        let engine = ComparisonEngine::from_rows(vec![row(0, 5.0, 3.0)], AssistantLabels::default());
        assert!(matches!(
            engine.paired_significance_test(Metric::Relevance),
            PairedTest::Insufficient { n: 1 }
        ));
    }

    #[test]
    fn effect_size_bands() {
        assert_eq!(EffectSize::classify(0.1), EffectSize::Negligible);
        assert_eq!(EffectSize::classify(-0.3), EffectSize::Small);
        assert_eq!(EffectSize::classify(0.6), EffectSize::Medium);
        assert_eq!(EffectSize::classify(-1.4), EffectSize::Large);
    }

    #[test]
    fn missing_metrics_are_omitted_from_group_means() {
        let mut incomplete = row(0, 4.0, 4.0);
        incomplete.a_clarity = None;
        incomplete.b_clarity = None;
        let engine =
            ComparisonEngine::from_rows(vec![incomplete], AssistantLabels::default());
        let breakdown = engine.breakdown_by(Dimension::Category);
        let group = breakdown.get("General").unwrap();
        assert!(group.assistant_a.metrics.contains_key("relevance"));
        assert!(!group.assistant_a.metrics.contains_key("clarity"));
        assert!(group.assistant_a.intent_rate.is_none());
    }

    #[test]
    fn quality_breakdown_carries_intent_rate() {
        let rows = vec![row(0, 4.0, 4.0), row(1, 3.0, 5.0)];
        let engine = ComparisonEngine::from_rows(rows, AssistantLabels::default());
        let breakdown = engine.breakdown_by(Dimension::Quality);
        let group = breakdown.get("Well-formed").unwrap();
        assert_eq!(group.count, 2);
        assert_eq!(group.assistant_a.intent_rate, Some(100.0));
    }
}
