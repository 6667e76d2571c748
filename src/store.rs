//! JSON-file persistence for the three campaign datasets.
//!
//! Queries, results and progress each live in one JSON file under the data
//! directory. Every save backs up the previous file version and then replaces
//! it atomically (write to a temp file, rename over). A file that fails to
//! decode is backed up and treated as empty so a corrupted dataset never
//! wedges the campaign.
//!
//! The store is deliberately stateless between calls: every read goes back to
//! disk so work queues and statistics always reflect the current on-disk
//! state, even while a batch is writing.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::types::{
    Assistant, ProgressEntry, Query, ResponseRecord, ResultEntry, ScoreSet, ScoreSource, Stage,
};

pub const QUERY_FILE: &str = "query_dataset.json";
pub const RESULTS_FILE: &str = "results.json";
pub const PROGRESS_FILE: &str = "progress.json";

pub type ResultsMap = BTreeMap<u64, ResultEntry>;
pub type ProgressMap = BTreeMap<u64, ProgressEntry>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("query {0} has no result entry")]
    UnknownQuery(u64),
    #[error("query {0} is missing a response; scores require both assistants' responses")]
    ResponsesIncomplete(u64),
    #[error("invalid scores: {0}")]
    InvalidScores(String),
    #[error("query {0} already has manual scores; automated scores will not overwrite them")]
    ManualScoresProtected(u64),
}

/// Handle to the on-disk datasets. Cheap to clone; holds only paths.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Data directory from `VERDICT_DATA_DIR`, defaulting to `./data`.
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("VERDICT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from("data")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    // -------------------------------------------------------------------
    // Loads
    // -------------------------------------------------------------------

    /// Load the query dataset, assigning sequential ids to entries that lack
    /// one. A missing or unreadable dataset is reported as empty.
    pub fn load_queries(&self) -> Result<Vec<Query>, StoreError> {
        let path = self.path(QUERY_FILE);
        if !path.exists() {
            warn!(path = %path.display(), "query dataset not found");
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let parsed: Vec<RawQuery> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to parse query dataset");
                return Ok(Vec::new());
            }
        };

        Ok(parsed
            .into_iter()
            .enumerate()
            .map(|(idx, q)| Query {
                id: q.id.unwrap_or(idx as u64),
                text: q.text,
                category: q.category,
                quality: q.quality,
                intent_clarity: q.intent_clarity,
            })
            .collect())
    }

    /// Load the results dataset. A corrupt file is backed up and replaced by
    /// an empty map on the next save.
    pub fn load_results(&self) -> Result<ResultsMap, StoreError> {
        self.load_map(RESULTS_FILE)
    }

    /// Load the progress cache. Same corruption policy as results.
    pub fn load_progress(&self) -> Result<ProgressMap, StoreError> {
        self.load_map(PROGRESS_FILE)
    }

    fn load_map<V: DeserializeOwned>(&self, file: &str) -> Result<BTreeMap<u64, V>, StoreError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt dataset; backing up and starting fresh");
                self.backup_file(&path)?;
                Ok(BTreeMap::new())
            }
        }
    }

    // -------------------------------------------------------------------
    // Saves
    // -------------------------------------------------------------------

    /// Save one assistant's response for a query, then refresh the progress
    /// cache for that query. Replaces any previous response wholesale.
    pub fn save_result(
        &self,
        query_id: u64,
        assistant: Assistant,
        record: ResponseRecord,
    ) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut results = self.load_results()?;
        let entry = results
            .entry(query_id)
            .or_insert_with(|| ResultEntry::new(query_id));
        *entry.response_mut(assistant) = Some(record);
        self.write_map(RESULTS_FILE, &results)?;

        let stage = match assistant {
            Assistant::A => Stage::AssistantA,
            Assistant::B => Stage::AssistantB,
        };
        self.update_progress(query_id, stage)
    }

    /// Save a score set for a query.
    ///
    /// Rejected synchronously, with nothing written, when the entry does not
    /// exist, either response is missing, any 1–5 metric is absent or out of
    /// band, or an automated set would overwrite a manual one.
    pub fn save_scores(&self, query_id: u64, scores: ScoreSet) -> Result<(), StoreError> {
        validate_scores(&scores)?;

        let _lock = self.lock_exclusive()?;
        let mut results = self.load_results()?;
        let entry = results
            .get_mut(&query_id)
            .ok_or(StoreError::UnknownQuery(query_id))?;
        if !entry.has_both_responses() {
            return Err(StoreError::ResponsesIncomplete(query_id));
        }
        if let Some(existing) = &entry.scores {
            if existing.source == ScoreSource::Manual && scores.source == ScoreSource::Automated {
                return Err(StoreError::ManualScoresProtected(query_id));
            }
        }
        entry.scores = Some(scores);
        self.write_map(RESULTS_FILE, &results)?;
        self.update_progress(query_id, Stage::Scoring)
    }

    fn update_progress(&self, query_id: u64, stage: Stage) -> Result<(), StoreError> {
        let mut progress = self.load_progress()?;
        let entry = progress.entry(query_id).or_default();
        match stage {
            Stage::AssistantA => entry.assistant_a_done = true,
            Stage::AssistantB => entry.assistant_b_done = true,
            Stage::Scoring => entry.scored = true,
        }
        entry.last_updated = Some(Utc::now());
        self.write_map(PROGRESS_FILE, &progress)
    }

    /// Replace the whole progress cache, e.g. after re-deriving it from the
    /// results dataset.
    pub fn write_progress(&self, progress: &ProgressMap) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        self.write_map(PROGRESS_FILE, progress)
    }

    /// Back up and remove the progress cache. Results are untouched.
    pub fn reset_progress(&self) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let path = self.path(PROGRESS_FILE);
        if path.exists() {
            self.backup_file(&path)?;
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn write_map<V: Serialize>(&self, file: &str, map: &BTreeMap<u64, V>) -> Result<(), StoreError> {
        let path = self.path(file);
        if path.exists() {
            self.backup_file(&path)?;
        }
        let raw = serde_json::to_string_pretty(map)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn backup_file(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            return Ok(());
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let backup = PathBuf::from(format!("{}.backup_{stamp}", path.display()));
        std::fs::copy(path, &backup)?;
        Ok(())
    }

    fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        StoreLock::new(&self.dir)
    }
}

fn validate_scores(scores: &ScoreSet) -> Result<(), StoreError> {
    for (name, half) in [("assistant_a", &scores.assistant_a), ("assistant_b", &scores.assistant_b)]
    {
        if !half.is_complete() {
            return Err(StoreError::InvalidScores(format!(
                "{name} must carry relevance, completeness and clarity in 1..=5"
            )));
        }
    }
    Ok(())
}

/// Exclusive advisory lock over the data directory, held for the duration of
/// a save. Guards the read-modify-write cycle against a second process.
#[derive(Debug)]
struct StoreLock {
    _file: File,
}

impl StoreLock {
    fn new(dir: &Path) -> Result<Self, StoreError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.join(".lock"))?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawQuery {
    #[serde(default)]
    id: Option<u64>,
    #[serde(alias = "query")]
    text: String,
    category: String,
    quality: crate::types::QueryQuality,
    intent_clarity: crate::types::IntentClarity,
}
