// Driver tests against a mock OpenAI server

use sqlgate_core::config::AssistantConfig;
use sqlgate_core::error::SqlGateError;
use sqlgate_core::llm::{LlmCallConfig, LlmDriver, LlmMessage};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::OpenAILlmDriver;

fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(chunk);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn call_config() -> LlmCallConfig {
    LlmCallConfig::from(&AssistantConfig::new("gpt-4o-mini").with_temperature(0.0))
}

fn driver_for(server: &MockServer) -> OpenAILlmDriver {
    OpenAILlmDriver::with_base_url("test-key", format!("{}/v1/chat/completions", server.uri()))
}

#[tokio::test]
async fn test_streams_text_and_metadata() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{"content":"{\"sql\": "}}]}"#,
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{"content":"\"SELECT 1\"}"}}]}"#,
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{},"finish_reason":"stop"}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "temperature": 0.0,
            "messages": [
                {"role": "system", "content": "schema"},
                {"role": "user", "content": "one row please"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let response = driver_for(&server)
        .chat_completion(
            vec![
                LlmMessage::system("schema"),
                LlmMessage::user("one row please"),
            ],
            &call_config(),
        )
        .await
        .unwrap();

    assert_eq!(response.text, "{\"sql\": \"SELECT 1\"}");
    assert_eq!(response.metadata.finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.metadata.model.as_deref(), Some("gpt-4o-mini"));
}

#[tokio::test]
async fn test_http_error_is_llm_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = driver_for(&server)
        .chat_completion(vec![LlmMessage::user("hi")], &call_config())
        .await
        .unwrap_err();

    match err {
        SqlGateError::Llm(message) => {
            assert!(message.contains("401"), "{}", message);
            assert!(message.contains("Incorrect API key provided"), "{}", message);
        }
        other => panic!("expected llm error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_llm_error() {
    // Port 9 (discard) is not expected to accept HTTP connections
    let driver = OpenAILlmDriver::with_base_url("test-key", "http://127.0.0.1:9/v1/chat/completions");

    let err = driver
        .chat_completion(vec![LlmMessage::user("hi")], &call_config())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::Llm(_)));
}

#[tokio::test]
async fn test_malformed_chunk_fails_completion() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
        "this is not json",
    ]);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let err = driver_for(&server)
        .chat_completion(vec![LlmMessage::user("hi")], &call_config())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::Llm(m) if m.contains("Failed to parse OpenAI chunk")));
}

#[tokio::test]
async fn test_final_chunk_text_is_kept() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{"content":"{\"sql\": \"SELECT 1\""}}]}"#,
        r#"{"model":"gpt-4o-mini","choices":[{"delta":{"content":"}"},"finish_reason":"stop"}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let response = driver_for(&server)
        .chat_completion(vec![LlmMessage::user("one row please")], &call_config())
        .await
        .unwrap();

    assert_eq!(response.text, "{\"sql\": \"SELECT 1\"}");
    assert_eq!(response.metadata.finish_reason.as_deref(), Some("stop"));
}
