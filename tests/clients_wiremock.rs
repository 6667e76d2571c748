use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use verdict_harness::client::{AssistantClient, ClientError, JudgeClient, ResponseJudge};
use verdict_harness::types::{IntentClarity, Query, QueryQuality};

fn test_query() -> Query {
    Query {
        id: 0,
        text: "What is the capital of France?".to_string(),
        category: "Informational".to_string(),
        quality: QueryQuality::WellFormed,
        intent_clarity: IntentClarity::High,
    }
}

fn assistant(server: &MockServer, model: &str) -> AssistantClient {
    AssistantClient::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(5),
        model,
        0.7,
        2000,
    )
    .unwrap()
}

#[tokio::test]
async fn assistant_builds_record_with_usage_and_no_web_search() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "Paris is the capital of France." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 25, "completion_tokens": 12, "total_tokens": 37 },
            "model": "gpt-4-turbo-2024"
        })))
        .mount(&server)
        .await;

    let client = assistant(&server, "gpt-4-turbo");
    let record = client.query("What is the capital of France?").await.unwrap();

    assert_eq!(record.text, "Paris is the capital of France.");
    assert!(!record.web_search_used);
    assert_eq!(record.citation_count, 0);
    let usage = record.token_usage.unwrap();
    assert_eq!(usage.total_tokens, 37);
    assert_eq!(record.model.as_deref(), Some("gpt-4-turbo-2024"));
    assert_eq!(record.finish_reason.as_deref(), Some("stop"));
    assert!(record.response_time_ms.unwrap() >= 0.0);
}

#[tokio::test]
async fn assistant_flags_web_search_from_annotations() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": "As of today...",
                    "annotations": [
                        {"type": "url_citation", "url_citation": {"url": "https://example.com/a"}},
                        {"type": "url_citation", "url_citation": {"url": "https://example.com/b"}}
                    ]
                },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 30, "completion_tokens": 40 }
        })))
        .mount(&server)
        .await;

    let client = assistant(&server, "gpt-4o-mini-search-preview");
    let record = client.query("latest news").await.unwrap();

    assert!(record.web_search_used);
    assert_eq!(record.citation_count, 2);
}

#[tokio::test]
async fn search_models_omit_temperature_and_send_search_options() {
    let server = MockServer::start().await;

    // The matcher pins web_search_options; a request carrying temperature
    // would also be rejected by the strict expectation below.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"web_search_options": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "ok" }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = assistant(&server, "gpt-4o-mini-search-preview");
    client.query("hello").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("temperature").is_none());
    assert!(body.get("web_search_options").is_some());
}

#[tokio::test]
async fn provider_errors_map_to_retryable_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "rate limit exceeded", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let client = assistant(&server, "gpt-4-turbo");
    let err = client.query("hello").await.unwrap_err();
    match err {
        ClientError::Provider {
            message,
            retryable,
            http_status,
        } => {
            assert!(message.contains("rate limit"));
            assert!(retryable);
            assert_eq!(http_status, Some(429));
        }
        other => panic!("expected Provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn judge_parses_fenced_json_with_legacy_clarity_key() {
    let server = MockServer::start().await;

    let content = "Here is my evaluation:\n```json\n{\"relevance\": 5, \"completeness\": 4, \
                   \"source_quality\": 4, \"intent_understood\": true, \"followups_needed\": false, \
                   \"reasoning\": \"Accurate and concise.\"}\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 400, "completion_tokens": 60 }
        })))
        .mount(&server)
        .await;

    let judge = JudgeClient::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(5),
        "gpt-4o",
    )
    .unwrap();

    let scores = judge
        .evaluate(&test_query(), "Paris is the capital of France.")
        .await
        .unwrap();
    assert_eq!(scores.relevance, 5);
    assert_eq!(scores.clarity, 4);
    assert!(scores.intent_understood);
    assert_eq!(scores.reasoning, "Accurate and concise.");
}

#[tokio::test]
async fn judge_surfaces_unparseable_output_as_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "I would rate this response quite highly." }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
        })))
        .mount(&server)
        .await;

    let judge = JudgeClient::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(5),
        "gpt-4o",
    )
    .unwrap();

    let err = judge.evaluate(&test_query(), "some response").await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)));
}
