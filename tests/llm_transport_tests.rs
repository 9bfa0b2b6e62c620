//! HTTP-level tests for the Gemini transport client against a mock server.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use contactfinder::config::LlmConfig;
use contactfinder::llm::{GeminiClient, LlmClient};

fn gemini_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ],
        "usageMetadata": {
            "promptTokenCount": 42,
            "candidatesTokenCount": 17,
            "totalTokenCount": 59
        }
    })
}

fn client_for(server: &MockServer) -> GeminiClient {
    let config = LlmConfig::default();
    GeminiClient::with_base_url(&config, "test-key".to_string(), server.uri())
}

#[tokio::test]
async fn test_complete_returns_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
            r#"[{"number": "+49", "type": "Main Line", "classification": "Primary"}]"#,
        )))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (text, usage) = client.complete("classify this").await.expect("call succeeds");
    assert!(text.contains("Main Line"));
    assert_eq!(usage.prompt_tokens, 42);
    assert_eq!(usage.completion_tokens, 17);
    assert_eq!(usage.total_tokens, 59);
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    // First attempt fails with a 500, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body("[]")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (text, _) = client.complete("retry me").await.expect("retry succeeds");
    assert_eq!(text, "[]");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.complete("nope").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_empty_candidates_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.complete("anything").await;
    assert!(result.is_err());
}
