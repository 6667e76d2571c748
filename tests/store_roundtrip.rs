use chrono::Utc;
use tempfile::tempdir;

use verdict_harness::store::{JsonStore, StoreError, PROGRESS_FILE, QUERY_FILE, RESULTS_FILE};
use verdict_harness::tracker::ProgressTracker;
use verdict_harness::types::{
    Assistant, AssistantScores, IntentClarity, QueryQuality, ResponseRecord, ScoreSet, ScoreSource,
    Stage,
};

fn write_query_dataset(store: &JsonStore, n: usize) {
    let queries: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "text": format!("query {i}"),
                "category": if i % 2 == 0 { "Informational" } else { "Transactional" },
                "quality": "Well-formed",
                "intent_clarity": "High",
            })
        })
        .collect();
    std::fs::write(
        store.dir().join(QUERY_FILE),
        serde_json::to_string_pretty(&queries).unwrap(),
    )
    .unwrap();
}

fn response(text: &str) -> ResponseRecord {
    ResponseRecord {
        text: text.to_string(),
        timestamp: Utc::now(),
        response_time_ms: Some(1200.0),
        token_usage: None,
        web_search_used: false,
        citation_count: 0,
        model: None,
        finish_reason: None,
    }
}

fn complete_scores(source: ScoreSource) -> ScoreSet {
    let half = AssistantScores {
        relevance: Some(4),
        completeness: Some(4),
        clarity: Some(4),
        intent_understood: true,
        followups_needed: false,
    };
    ScoreSet {
        assistant_a: half.clone(),
        assistant_b: half,
        source,
        notes: None,
        timestamp: Utc::now(),
    }
}

#[test]
fn save_and_reload_round_trips() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_query_dataset(&store, 3);

    store.save_result(0, Assistant::A, response("alpha")).unwrap();
    store.save_result(0, Assistant::B, response("beta")).unwrap();

    let results = store.load_results().unwrap();
    let entry = results.get(&0).unwrap();
    assert_eq!(entry.assistant_a.as_ref().unwrap().text, "alpha");
    assert_eq!(entry.assistant_b.as_ref().unwrap().text, "beta");
    assert!(entry.has_both_responses());
    assert!(entry.scores.is_none());

    let progress = store.load_progress().unwrap();
    let p = progress.get(&0).unwrap();
    assert!(p.assistant_a_done && p.assistant_b_done && !p.scored);
}

#[test]
fn save_backs_up_the_previous_file_version() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();

    store.save_result(0, Assistant::A, response("v1")).unwrap();
    store.save_result(0, Assistant::A, response("v2")).unwrap();

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&format!("{RESULTS_FILE}.backup_"))
        })
        .collect();
    assert!(!backups.is_empty(), "expected a results backup file");

    // Replacement is wholesale: latest text wins.
    let results = store.load_results().unwrap();
    assert_eq!(results.get(&0).unwrap().assistant_a.as_ref().unwrap().text, "v2");
}

#[test]
fn corrupt_results_file_is_backed_up_and_reset() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();

    std::fs::write(dir.path().join(RESULTS_FILE), "{not valid json").unwrap();

    let results = store.load_results().unwrap();
    assert!(results.is_empty());

    let backed_up = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&format!("{RESULTS_FILE}.backup_"))
        });
    assert!(backed_up, "corrupt file should have been backed up");

    // The store keeps working afterwards.
    store.save_result(1, Assistant::A, response("fresh")).unwrap();
    assert_eq!(store.load_results().unwrap().len(), 1);
}

#[test]
fn scores_require_an_entry_with_both_responses() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();

    assert!(matches!(
        store.save_scores(7, complete_scores(ScoreSource::Manual)),
        Err(StoreError::UnknownQuery(7))
    ));

    store.save_result(7, Assistant::A, response("only A")).unwrap();
    assert!(matches!(
        store.save_scores(7, complete_scores(ScoreSource::Manual)),
        Err(StoreError::ResponsesIncomplete(7))
    ));
}

#[test]
fn invalid_scores_are_rejected_without_a_partial_write() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    store.save_result(0, Assistant::A, response("a")).unwrap();
    store.save_result(0, Assistant::B, response("b")).unwrap();

    let mut bad = complete_scores(ScoreSource::Manual);
    bad.assistant_b.relevance = None;
    assert!(matches!(
        store.save_scores(0, bad),
        Err(StoreError::InvalidScores(_))
    ));
    assert!(store.load_results().unwrap().get(&0).unwrap().scores.is_none());
}

#[test]
fn manual_scores_are_never_overwritten_by_automated_ones() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    store.save_result(0, Assistant::A, response("a")).unwrap();
    store.save_result(0, Assistant::B, response("b")).unwrap();

    store.save_scores(0, complete_scores(ScoreSource::Manual)).unwrap();
    assert!(matches!(
        store.save_scores(0, complete_scores(ScoreSource::Automated)),
        Err(StoreError::ManualScoresProtected(0))
    ));

    // The other direction is allowed: manual validation replaces judge output.
    let dir2 = tempdir().unwrap();
    let store2 = JsonStore::new(dir2.path()).unwrap();
    store2.save_result(0, Assistant::A, response("a")).unwrap();
    store2.save_result(0, Assistant::B, response("b")).unwrap();
    store2.save_scores(0, complete_scores(ScoreSource::Automated)).unwrap();
    store2.save_scores(0, complete_scores(ScoreSource::Manual)).unwrap();
    let saved = store2.load_results().unwrap();
    assert_eq!(
        saved.get(&0).unwrap().scores.as_ref().unwrap().source,
        ScoreSource::Manual
    );
}

#[test]
fn queries_without_ids_get_their_index() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    let raw = serde_json::json!([
        {"text": "first", "category": "Informational", "quality": "Well-formed", "intent_clarity": "High"},
        {"text": "second", "category": "Informational", "quality": "Ambiguous", "intent_clarity": "Low"},
    ]);
    std::fs::write(dir.path().join(QUERY_FILE), raw.to_string()).unwrap();

    let queries = store.load_queries().unwrap();
    assert_eq!(queries[0].id, 0);
    assert_eq!(queries[1].id, 1);
    assert_eq!(queries[1].quality, QueryQuality::Ambiguous);
    assert_eq!(queries[1].intent_clarity, IntentClarity::Low);
}

// =============================================================================
// Tracker behavior over the store
// =============================================================================

#[test]
fn work_queues_derive_from_results_not_the_progress_cache() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_query_dataset(&store, 4);
    let tracker = ProgressTracker::new(store.clone());

    store.save_result(0, Assistant::A, response("a0")).unwrap();
    store.save_result(0, Assistant::B, response("b0")).unwrap();
    store.save_result(1, Assistant::A, response("a1")).unwrap();

    // A stale (deleted) progress cache must not change the answers.
    store.reset_progress().unwrap();

    let need_a: Vec<u64> = tracker
        .queries_needing(Stage::AssistantA, None)
        .unwrap()
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(need_a, vec![2, 3]);

    let need_b: Vec<u64> = tracker
        .queries_needing(Stage::AssistantB, None)
        .unwrap()
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(need_b, vec![1, 2, 3]);

    let need_scores: Vec<u64> = tracker
        .queries_needing(Stage::Scoring, None)
        .unwrap()
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(need_scores, vec![0]);
}

#[test]
fn completion_stats_match_a_manual_count() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_query_dataset(&store, 5);
    let tracker = ProgressTracker::new(store.clone());

    for id in 0..4u64 {
        store.save_result(id, Assistant::A, response("a")).unwrap();
    }
    for id in 0..3u64 {
        store.save_result(id, Assistant::B, response("b")).unwrap();
    }
    for id in 0..2u64 {
        store.save_scores(id, complete_scores(ScoreSource::Automated)).unwrap();
    }

    let stats = tracker.completion_stats().unwrap();
    assert_eq!(stats.total_queries, 5);
    assert_eq!(stats.assistant_a_responses, 4);
    assert_eq!(stats.assistant_b_responses, 3);
    assert_eq!(stats.scored, 2);
    assert_eq!(stats.fully_complete, 2);
    assert!((stats.percent_complete - 40.0).abs() < 1e-9);

    // Progress invariant: every scored query has both responses.
    let results = store.load_results().unwrap();
    for entry in results.values() {
        if entry.scores.is_some() {
            assert!(entry.has_both_responses());
        }
    }
}

#[test]
fn scored_queries_leave_the_scoring_queue() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_query_dataset(&store, 2);
    let tracker = ProgressTracker::new(store.clone());

    for id in 0..2u64 {
        store.save_result(id, Assistant::A, response("a")).unwrap();
        store.save_result(id, Assistant::B, response("b")).unwrap();
    }
    store.save_scores(0, complete_scores(ScoreSource::Manual)).unwrap();

    let items = tracker.scoring_items(None).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].query.id, 1);
    assert_eq!(items[0].response_a.text, "a");
}

#[test]
fn rebuild_cache_re_derives_progress_from_results() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_query_dataset(&store, 3);
    let tracker = ProgressTracker::new(store.clone());

    store.save_result(0, Assistant::A, response("a")).unwrap();
    store.save_result(0, Assistant::B, response("b")).unwrap();
    store.save_scores(0, complete_scores(ScoreSource::Automated)).unwrap();
    store.save_result(1, Assistant::A, response("a")).unwrap();

    // Clobber the cache with nonsense, then rebuild.
    std::fs::write(dir.path().join(PROGRESS_FILE), "{}").unwrap();
    let progress = tracker.rebuild_cache().unwrap();

    let p0 = progress.get(&0).unwrap();
    assert!(p0.assistant_a_done && p0.assistant_b_done && p0.scored);
    let p1 = progress.get(&1).unwrap();
    assert!(p1.assistant_a_done && !p1.assistant_b_done && !p1.scored);
    assert!(!progress.contains_key(&2));

    let reloaded = store.load_progress().unwrap();
    assert_eq!(reloaded.len(), progress.len());
}
