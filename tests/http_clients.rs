mod common;

use httpmock::prelude::*;
use serde_json::json;

use codeloom::accounting::TokenDataPoint;
use codeloom::llm::{ChatApiClient, ChatRequest, CompletionClient};
use codeloom::message::Message;
use codeloom::tracker::{HttpTracker, SyncError, TrackerRef, UsageTracker};

#[tokio::test]
async fn tracker_posts_per_model_aggregates() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/usage")
                .json_body_partial(r#"{"tracker_id": "issue-9"}"#);
            then.status(200);
        })
        .await;

    let tracker = HttpTracker::new();
    let ledger = vec![
        TokenDataPoint::now("model-a", 10, 2, "plan"),
        TokenDataPoint::now("model-a", 20, 4, "act"),
    ];
    tracker
        .push_usage(
            &TrackerRef {
                endpoint: server.base_url(),
                tracker_id: "issue-9".into(),
            },
            "run_x",
            &ledger,
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn tracker_rejection_is_reported_as_sync_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/usage");
            then.status(503);
        })
        .await;

    let tracker = HttpTracker::new();
    let err = tracker
        .push_usage(
            &TrackerRef {
                endpoint: server.base_url(),
                tracker_id: "issue-9".into(),
            },
            "run_x",
            &[TokenDataPoint::now("m", 1, 1, "n")],
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::Rejected { status: 503 }));
}

#[tokio::test]
async fn chat_client_parses_content_tool_call_and_usage() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{
                    "message": {
                        "content": "Running the tests now.",
                        "tool_calls": [{
                            "function": {
                                "name": "shell",
                                "arguments": "{\"command\": \"cargo test\"}"
                            }
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 321, "completion_tokens": 42}
            }));
        })
        .await;

    let client = ChatApiClient::new(server.base_url(), "test-key");
    let response = client
        .complete(ChatRequest {
            model: "anthropic:claude-sonnet-4-0".into(),
            messages: vec![Message::user("run the tests")],
            tools: vec![],
        })
        .await
        .unwrap();

    assert_eq!(response.content, "Running the tests now.");
    let call = response.tool_call.unwrap();
    assert_eq!(call.name, "shell");
    assert_eq!(call.args, json!({"command": "cargo test"}));
    assert_eq!(response.usage.prompt_tokens, 321);
    assert_eq!(response.usage.completion_tokens, 42);
}

#[tokio::test]
async fn chat_client_surfaces_api_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        })
        .await;

    let client = ChatApiClient::new(server.base_url(), "test-key");
    let err = client
        .complete(ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
        })
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        codeloom::llm::LlmError::Api { status: 429, .. }
    ));
}
