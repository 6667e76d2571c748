use async_trait::async_trait;
use chrono::Utc;
use tempfile::tempdir;

use verdict_harness::client::{auto_score_pending, ClientError, JudgeScores, ResponseJudge};
use verdict_harness::store::{JsonStore, QUERY_FILE};
use verdict_harness::types::{
    Assistant, AssistantScores, Query, ResponseRecord, ScoreSet, ScoreSource,
};

fn write_queries(store: &JsonStore, n: usize) {
    let queries: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "text": format!("query {i}"),
                "category": "Informational",
                "quality": "Well-formed",
                "intent_clarity": "High",
            })
        })
        .collect();
    std::fs::write(store.dir().join(QUERY_FILE), serde_json::to_string(&queries).unwrap())
        .unwrap();
}

fn response(text: &str) -> ResponseRecord {
    ResponseRecord {
        text: text.to_string(),
        timestamp: Utc::now(),
        response_time_ms: None,
        token_usage: None,
        web_search_used: false,
        citation_count: 0,
        model: None,
        finish_reason: None,
    }
}

/// Scores everything 4 across the board, but fails on one query id.
struct FixedJudge {
    fail_on: Option<u64>,
}

#[async_trait]
impl ResponseJudge for FixedJudge {
    async fn evaluate(
        &self,
        query: &Query,
        _response_text: &str,
    ) -> Result<JudgeScores, ClientError> {
        if Some(query.id) == self.fail_on {
            return Err(ClientError::parse("malformed judge output"));
        }
        Ok(JudgeScores {
            relevance: 4,
            completeness: 4,
            clarity: 4,
            intent_understood: true,
            followups_needed: false,
            reasoning: "solid".to_string(),
        })
    }
}

#[tokio::test]
async fn auto_score_fills_unscored_queries_and_skips_failures() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_queries(&store, 3);

    for id in 0..3u64 {
        store.save_result(id, Assistant::A, response("a")).unwrap();
        store.save_result(id, Assistant::B, response("b")).unwrap();
    }

    let judge = FixedJudge { fail_on: Some(1) };
    let summary = auto_score_pending(&store, &judge, None).await.unwrap();

    assert_eq!(summary.scored, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("query 1"));

    let results = store.load_results().unwrap();
    assert_eq!(
        results.get(&0).unwrap().scores.as_ref().unwrap().source,
        ScoreSource::Automated
    );
    assert!(results.get(&1).unwrap().scores.is_none());
    assert!(results.get(&2).unwrap().scores.is_some());
}

#[tokio::test]
async fn auto_score_leaves_manual_scores_untouched() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_queries(&store, 2);

    for id in 0..2u64 {
        store.save_result(id, Assistant::A, response("a")).unwrap();
        store.save_result(id, Assistant::B, response("b")).unwrap();
    }

    let manual_half = AssistantScores {
        relevance: Some(5),
        completeness: Some(5),
        clarity: Some(5),
        intent_understood: true,
        followups_needed: false,
    };
    store
        .save_scores(
            0,
            ScoreSet {
                assistant_a: manual_half.clone(),
                assistant_b: manual_half,
                source: ScoreSource::Manual,
                notes: Some("hand-validated".to_string()),
                timestamp: Utc::now(),
            },
        )
        .unwrap();

    let judge = FixedJudge { fail_on: None };
    let summary = auto_score_pending(&store, &judge, None).await.unwrap();

    // Query 0 is already scored so it is not even queued.
    assert_eq!(summary.scored, 1);
    assert_eq!(summary.skipped, 0);

    let results = store.load_results().unwrap();
    let kept = results.get(&0).unwrap().scores.as_ref().unwrap();
    assert_eq!(kept.source, ScoreSource::Manual);
    assert_eq!(kept.assistant_a.relevance, Some(5));
}

#[tokio::test]
async fn auto_score_respects_the_limit() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path()).unwrap();
    write_queries(&store, 5);

    for id in 0..5u64 {
        store.save_result(id, Assistant::A, response("a")).unwrap();
        store.save_result(id, Assistant::B, response("b")).unwrap();
    }

    let judge = FixedJudge { fail_on: None };
    let summary = auto_score_pending(&store, &judge, Some(2)).await.unwrap();
    assert_eq!(summary.scored, 2);

    let results = store.load_results().unwrap();
    let scored = results.values().filter(|e| e.scores.is_some()).count();
    assert_eq!(scored, 2);
}
