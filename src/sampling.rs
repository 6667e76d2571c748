//! Stratified selection of queries for manual scoring validation.
//!
//! The sample is biased on purpose: after guaranteeing category coverage,
//! remaining slots go to the hard strata (poorly-formed / ambiguous quality,
//! low / very-low intent clarity) first, since those are the queries expected
//! to reveal differences between the assistants. Selection is deterministic
//! for a fixed seed.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::types::Query;

pub const DEFAULT_SEED: u64 = 7919;

#[derive(Debug, Clone)]
pub struct StratifiedSampler {
    seed: u64,
}

impl Default for StratifiedSampler {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl StratifiedSampler {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Select at most `target_size` queries, ordered by id.
    ///
    /// Guarantees, in priority order:
    /// 1. every category present in `queries` contributes at least one query
    ///    (degrading category-by-category when `target_size` is smaller than
    ///    the category count);
    /// 2. remaining slots fill from the hard strata;
    /// 3. any slots still open fill uniformly at random;
    /// 4. no duplicates; fewer inputs than `target_size` returns them all.
    pub fn select(&self, queries: &[Query], target_size: usize) -> Vec<Query> {
        if queries.len() <= target_size {
            let mut all: Vec<Query> = queries.to_vec();
            all.sort_by_key(|q| q.id);
            return all;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);

        // Categories in first-occurrence order, so allocation is stable for a
        // given dataset ordering.
        let mut categories: Vec<&str> = Vec::new();
        for q in queries {
            if !categories.iter().any(|c| *c == q.category) {
                categories.push(&q.category);
            }
        }

        let per_category = (target_size / categories.len().max(1)).max(1);

        let mut selected: Vec<Query> = Vec::new();
        let mut selected_ids: HashSet<u64> = HashSet::new();

        for category in &categories {
            let open = target_size.saturating_sub(selected.len());
            if open == 0 {
                break;
            }
            let pool: Vec<&Query> = queries
                .iter()
                .filter(|q| q.category == *category && !selected_ids.contains(&q.id))
                .collect();
            let n = per_category.min(pool.len()).min(open);
            take_random(&mut rng, &pool, n, &mut selected, &mut selected_ids);
        }

        // Hard strata next: union of hard quality and hard intent clarity,
        // deduplicated by id.
        let mut remaining = target_size.saturating_sub(selected.len());
        if remaining > 0 {
            let mut seen = HashSet::new();
            let pool: Vec<&Query> = queries
                .iter()
                .filter(|q| q.quality.is_hard() || q.intent_clarity.is_hard())
                .filter(|q| !selected_ids.contains(&q.id) && seen.insert(q.id))
                .collect();
            let n = remaining.min(pool.len());
            take_random(&mut rng, &pool, n, &mut selected, &mut selected_ids);
            remaining -= n;
        }

        // Uniform fill for whatever is left.
        if remaining > 0 {
            let pool: Vec<&Query> = queries
                .iter()
                .filter(|q| !selected_ids.contains(&q.id))
                .collect();
            let n = remaining.min(pool.len());
            take_random(&mut rng, &pool, n, &mut selected, &mut selected_ids);
        }

        selected.sort_by_key(|q| q.id);
        selected
    }

    /// Counts per category / quality / intent clarity, for eyeballing the
    /// stratification.
    pub fn distribution(sample: &[Query]) -> SampleDistribution {
        let mut by_category = BTreeMap::new();
        let mut by_quality = BTreeMap::new();
        let mut by_intent_clarity = BTreeMap::new();
        for q in sample {
            *by_category.entry(q.category.clone()).or_insert(0usize) += 1;
            *by_quality
                .entry(q.quality.as_str().to_string())
                .or_insert(0usize) += 1;
            *by_intent_clarity
                .entry(q.intent_clarity.as_str().to_string())
                .or_insert(0usize) += 1;
        }
        SampleDistribution {
            total: sample.len(),
            by_category,
            by_quality,
            by_intent_clarity,
        }
    }
}

fn take_random(
    rng: &mut StdRng,
    pool: &[&Query],
    n: usize,
    selected: &mut Vec<Query>,
    selected_ids: &mut HashSet<u64>,
) {
    if n == 0 || pool.is_empty() {
        return;
    }
    for idx in rand::seq::index::sample(rng, pool.len(), n) {
        let q = pool[idx];
        selected.push(q.clone());
        selected_ids.insert(q.id);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleDistribution {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_quality: BTreeMap<String, usize>,
    pub by_intent_clarity: BTreeMap<String, usize>,
}

// =============================================================================
// Session-scoped sample membership
// =============================================================================

/// Holds the current validation sample for one session.
///
/// Generated at most once unless explicitly regenerated; regeneration
/// replaces the membership wholesale.
#[derive(Debug, Default)]
pub struct SampleHandle {
    ids: Option<Vec<u64>>,
}

impl SampleHandle {
    pub fn is_generated(&self) -> bool {
        self.ids.is_some()
    }

    pub fn ids(&self) -> Option<&[u64]> {
        self.ids.as_deref()
    }

    /// Select a fresh sample, discarding any previous membership.
    pub fn regenerate(
        &mut self,
        sampler: &StratifiedSampler,
        queries: &[Query],
        target_size: usize,
    ) -> Vec<Query> {
        let sample = sampler.select(queries, target_size);
        self.ids = Some(sample.iter().map(|q| q.id).collect());
        sample
    }

    /// Restrict a scoring queue to the sample, when one is active.
    pub fn filter<'a>(&self, queries: &'a [Query]) -> Vec<&'a Query> {
        match &self.ids {
            Some(ids) => queries.iter().filter(|q| ids.contains(&q.id)).collect(),
            None => queries.iter().collect(),
        }
    }
}
