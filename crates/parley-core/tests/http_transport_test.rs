//! `HttpTransport` request shapes and error mapping against a mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_core::backend::{
    BackendError, BackendId, BackendRequest, CallOptions, ConversationTurn, Endpoints,
    HttpTransport, Transport,
};

fn transport_for(backend: BackendId, server: &MockServer) -> HttpTransport {
    HttpTransport::with_endpoints(Endpoints::new().with_override(backend, server.uri()))
}

fn request<'a>(
    backend: BackendId,
    model: &'a str,
    turns: &'a [ConversationTurn],
    options: CallOptions,
) -> BackendRequest<'a> {
    BackendRequest {
        backend,
        credential: "test-key-0123456789",
        model,
        system_prompt: "You are Boolean.",
        conversation: turns,
        options,
    }
}

fn turns() -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::user("Opening prompt"),
        ConversationTurn::agent("Opening reply"),
        ConversationTurn::user("Round two prompt"),
    ]
}

#[tokio::test]
async fn anthropic_request_shape_and_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key-0123456789"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "system": "You are Boolean.",
            "max_tokens": 2048,
            "messages": [
                { "role": "user", "content": "Opening prompt" },
                { "role": "assistant", "content": "Opening reply" },
                { "role": "user", "content": "Round two prompt" },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "First half, " },
                { "type": "text", "text": "second half." },
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let turns = turns();
    let reply = transport_for(BackendId::Anthropic, &server)
        .send(&request(BackendId::Anthropic, "claude-test", &turns, CallOptions::default()))
        .await
        .unwrap();
    assert_eq!(reply, "First half, second half.");
}

#[tokio::test]
async fn google_request_uses_query_key_and_model_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(query_param("key", "test-key-0123456789"))
        .and(body_partial_json(json!({
            "system_instruction": { "parts": [{ "text": "You are Boolean." }] },
            "contents": [
                { "role": "user", "parts": [{ "text": "Opening prompt" }] },
                { "role": "model", "parts": [{ "text": "Opening reply" }] },
                { "role": "user", "parts": [{ "text": "Round two prompt" }] },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Gemini says hi." }] } }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let turns = turns();
    let reply = transport_for(BackendId::Google, &server)
        .send(&request(BackendId::Google, "gemini-test", &turns, CallOptions::default()))
        .await
        .unwrap();
    assert_eq!(reply, "Gemini says hi.");
}

#[tokio::test]
async fn chat_completions_put_system_message_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key-0123456789"))
        .and(body_partial_json(json!({
            "model": "llama-test",
            "messages": [
                { "role": "system", "content": "You are Boolean." },
                { "role": "user", "content": "Opening prompt" },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Groq reply" } }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let turns = vec![ConversationTurn::user("Opening prompt")];
    let reply = transport_for(BackendId::Groq, &server)
        .send(&request(BackendId::Groq, "llama-test", &turns, CallOptions::default()))
        .await
        .unwrap();
    assert_eq!(reply, "Groq reply");
}

async fn error_for(status: u16, body: &str) -> BackendError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;

    let turns = vec![ConversationTurn::user("hello")];
    transport_for(BackendId::Openai, &server)
        .send(&request(BackendId::Openai, "gpt-test", &turns, CallOptions::default()))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn status_codes_map_to_typed_errors() {
    let err = error_for(401, "invalid api key").await;
    assert!(matches!(err, BackendError::Auth { status: 401, .. }), "{err:?}");
    assert_eq!(err.diagnosis(), "check credentials");

    let err = error_for(429, "slow down").await;
    assert!(matches!(err, BackendError::RateLimited { .. }), "{err:?}");

    let err = error_for(503, "maintenance").await;
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.diagnosis(), "backend outage");
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn blank_and_malformed_bodies_are_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "   " } }],
        })))
        .mount(&server)
        .await;
    let turns = vec![ConversationTurn::user("hello")];
    let err = transport_for(BackendId::Openai, &server)
        .send(&request(BackendId::Openai, "gpt-test", &turns, CallOptions::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::EmptyResponse { backend: BackendId::Openai }));

    let err = error_for(200, "<html>not json</html>").await;
    assert!(matches!(err, BackendError::Malformed { .. }), "{err:?}");
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({ "choices": [{ "message": { "content": "late" } }] })),
        )
        .mount(&server)
        .await;

    let options = CallOptions {
        timeout: Duration::from_millis(50),
        ..CallOptions::default()
    };
    let turns = vec![ConversationTurn::user("hello")];
    let err = transport_for(BackendId::Groq, &server)
        .send(&request(BackendId::Groq, "llama-test", &turns, options))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Timeout { backend: BackendId::Groq, .. }), "{err:?}");
}
