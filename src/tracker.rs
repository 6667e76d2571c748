//! Work-queue derivation and completion statistics.
//!
//! Everything here recomputes from the results dataset, the single source of
//! truth. The progress file is only a cache: it is refreshed on every save
//! and can be rebuilt from scratch, but it is never consulted for statistics,
//! so a lagging cache (crash mid-save, hand-edited files) cannot skew
//! reported completion.

use chrono::Utc;
use serde::Serialize;

use crate::store::{JsonStore, ProgressMap, StoreError};
use crate::types::{Query, ResponseRecord, ResultEntry, Stage};

#[derive(Debug, Clone, Serialize)]
pub struct CompletionStats {
    pub total_queries: usize,
    pub assistant_a_responses: usize,
    pub assistant_b_responses: usize,
    pub scored: usize,
    pub fully_complete: usize,
    pub percent_complete: f64,
}

/// A query ready for scoring, with both responses attached.
#[derive(Debug, Clone)]
pub struct ScoringItem {
    pub query: Query,
    pub response_a: ResponseRecord,
    pub response_b: ResponseRecord,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: JsonStore,
}

impl ProgressTracker {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Queries still lacking the given stage, in dataset order, optionally
    /// capped. Re-reads the store on every call so a batch that finished
    /// since the last call is not handed out again.
    ///
    /// A query needs scoring iff both responses exist and no score set —
    /// manual or automated — does.
    pub fn queries_needing(
        &self,
        stage: Stage,
        limit: Option<usize>,
    ) -> Result<Vec<Query>, StoreError> {
        let queries = self.store.load_queries()?;
        let results = self.store.load_results()?;
        let cap = limit.unwrap_or(usize::MAX);

        let mut needed = Vec::new();
        for query in queries {
            let entry = results.get(&query.id);
            if stage_outstanding(stage, entry) {
                needed.push(query);
            }
            if needed.len() >= cap {
                break;
            }
        }
        Ok(needed)
    }

    /// Scoring queue with both responses attached, for the judge or for
    /// manual validation.
    pub fn scoring_items(&self, limit: Option<usize>) -> Result<Vec<ScoringItem>, StoreError> {
        let queries = self.store.load_queries()?;
        let results = self.store.load_results()?;
        let cap = limit.unwrap_or(usize::MAX);

        let mut items = Vec::new();
        for query in queries {
            let Some(entry) = results.get(&query.id) else {
                continue;
            };
            if entry.scores.is_some() {
                continue;
            }
            if let (Some(a), Some(b)) = (&entry.assistant_a, &entry.assistant_b) {
                items.push(ScoringItem {
                    query,
                    response_a: a.clone(),
                    response_b: b.clone(),
                });
                if items.len() >= cap {
                    break;
                }
            }
        }
        Ok(items)
    }

    /// Completion counts recomputed by scanning the results dataset.
    pub fn completion_stats(&self) -> Result<CompletionStats, StoreError> {
        let total = self.store.load_queries()?.len();
        let results = self.store.load_results()?;

        let mut a_done = 0usize;
        let mut b_done = 0usize;
        let mut scored = 0usize;
        let mut fully_complete = 0usize;
        for entry in results.values() {
            if entry.assistant_a.is_some() {
                a_done += 1;
            }
            if entry.assistant_b.is_some() {
                b_done += 1;
            }
            if entry.scores.is_some() {
                scored += 1;
            }
            if entry.is_fully_complete() {
                fully_complete += 1;
            }
        }

        Ok(CompletionStats {
            total_queries: total,
            assistant_a_responses: a_done,
            assistant_b_responses: b_done,
            scored,
            fully_complete,
            percent_complete: if total > 0 {
                fully_complete as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
    }

    /// Re-derive the progress cache from the results dataset and persist it.
    pub fn rebuild_cache(&self) -> Result<ProgressMap, StoreError> {
        let results = self.store.load_results()?;
        let now = Utc::now();
        let progress: ProgressMap = results
            .iter()
            .map(|(id, entry)| (*id, crate::types::ProgressEntry::from_result(entry, now)))
            .collect();
        self.store.write_progress(&progress)?;
        Ok(progress)
    }
}

fn stage_outstanding(stage: Stage, entry: Option<&ResultEntry>) -> bool {
    match (stage, entry) {
        (Stage::AssistantA, None) | (Stage::AssistantB, None) => true,
        (Stage::Scoring, None) => false,
        (Stage::AssistantA, Some(e)) => e.assistant_a.is_none(),
        (Stage::AssistantB, Some(e)) => e.assistant_b.is_none(),
        (Stage::Scoring, Some(e)) => e.has_both_responses() && e.scores.is_none(),
    }
}
