//! HTTP-level tests for the OpenAI-compatible backend

use std::time::Duration;

use jobpilot_provider::{
    ChatParams, Message, OpenAiCompatProvider, Provider, ProviderError, MAX_RETRY_AFTER,
};
use mockito::{Matcher, Server};
use serde_json::json;

fn params() -> ChatParams {
    ChatParams {
        model: String::new(),
        messages: vec![Message::system("You are a job search agent."), Message::user("Begin.")],
        max_tokens: 1024,
        temperature: 0.7,
    }
}

fn provider(base: &str) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new("test-key", base, "llama-test", Duration::from_secs(5))
}

#[tokio::test]
async fn test_successful_completion() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama-test",
            "max_tokens": 1024
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Thought: start\nAction: scrape_jobs" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 40, "completion_tokens": 8, "total_tokens": 48 }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let response = provider(&server.url()).chat(params()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        response.usable_text().as_deref(),
        Some("Thought: start\nAction: scrape_jobs")
    );
    assert_eq!(response.usage.total_tokens, 48);
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"error":{"message":"slow down"}}"#)
        .create_async()
        .await;

    let result = provider(&server.url()).chat(params()).await;

    match result {
        Err(ProviderError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("Expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_without_header() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .create_async()
        .await;

    let result = provider(&server.url()).chat(params()).await;
    assert!(matches!(
        result,
        Err(ProviderError::RateLimited { retry_after: None })
    ));
}

async fn rate_limited_with(header: &str) -> Option<Duration> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", header)
        .create_async()
        .await;

    match provider(&server.url()).chat(params()).await {
        Err(ProviderError::RateLimited { retry_after }) => retry_after,
        other => panic!("Expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_huge_retry_after_is_capped() {
    assert_eq!(rate_limited_with("1e30").await, Some(MAX_RETRY_AFTER));
    assert_eq!(
        rate_limited_with("18446744073709551616").await,
        Some(MAX_RETRY_AFTER)
    );
}

#[tokio::test]
async fn test_unusable_retry_after_is_no_hint() {
    assert_eq!(rate_limited_with("soon").await, None);
    assert_eq!(rate_limited_with("-5").await, None);
    assert_eq!(rate_limited_with("NaN").await, None);
    assert_eq!(
        rate_limited_with("Wed, 21 Oct 2026 07:28:00 GMT").await,
        None
    );
    assert_eq!(rate_limited_with("1.5").await, Some(Duration::from_millis(1500)));
}

#[tokio::test]
async fn test_server_error_surfaces_message() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body(r#"{"error":{"message":"model is overloaded"}}"#)
        .create_async()
        .await;

    match provider(&server.url()).chat(params()).await {
        Err(ProviderError::Api(msg)) => assert_eq!(msg, "model is overloaded"),
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_without_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    match provider(&server.url()).chat(params()).await {
        Err(ProviderError::Api(msg)) => assert_eq!(msg, "HTTP 503"),
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_null_content_is_not_usable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}]}"#)
        .create_async()
        .await;

    let response = provider(&server.url()).chat(params()).await.unwrap();
    assert!(response.usable_text().is_none());
    assert_eq!(response.finish_reason, "length");
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // nothing listens on port 9 locally
    let provider = OpenAiCompatProvider::new(
        "test-key",
        "http://127.0.0.1:9",
        "llama-test",
        Duration::from_secs(2),
    );

    let err = provider.chat(params()).await.unwrap_err();
    assert!(
        matches!(err, ProviderError::Connection(_)),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_transport());
}
