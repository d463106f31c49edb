//! End-to-end wire-compatibility checks against a mock upstream (§8
//! scenarios S1, S3, S6). Unlike the adapters' own unit tests, these drive
//! the full HTTP round trip through `reqwest` against a `wiremock` server,
//! so they catch anything the unit-level `format_request`/`convert_*`
//! helpers can't: header casing, path construction, and the exact JSON
//! actually placed on the wire.

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ultrafast_models_sdk::providers::anthropic::AnthropicProvider;
use ultrafast_models_sdk::providers::openai::OpenAIProvider;
use ultrafast_models_sdk::providers::{Provider, ProviderConfig};
use ultrafast_models_sdk::{ChatRequest, Message};

/// S1 — OpenAI happy path, non-streaming.
#[tokio::test]
async fn s1_openai_happy_path_non_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .mount(&server)
        .await;

    let provider = OpenAIProvider::new(
        ProviderConfig::new("openai", "sk-test").with_base_url(server.uri()),
    )
    .unwrap();

    let response = provider
        .chat_completion(ChatRequest {
            model: "gpt-4".to_string(),
            messages: vec![Message::user("hi")],
            stream: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.choices[0].message.content, "hello");
    assert_eq!(response.usage.unwrap().total_tokens, 2);
}

/// S3 — gpt-5 parameter rewrite: outgoing payload carries
/// `max_completion_tokens` and omits every sampling parameter and the old
/// `max_tokens` name.
#[tokio::test]
async fn s3_gpt5_rewrites_max_tokens_and_drops_sampling_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-5-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .mount(&server)
        .await;

    let provider = OpenAIProvider::new(
        ProviderConfig::new("openai", "sk-test").with_base_url(server.uri()),
    )
    .unwrap();

    provider
        .chat_completion(ChatRequest {
            model: "gpt-5-mini".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens: Some(128),
            temperature: Some(0.2),
            ..Default::default()
        })
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["max_completion_tokens"], 128);
    assert!(body.get("max_tokens").is_none());
    assert!(body.get("temperature").is_none());
    assert!(body.get("top_p").is_none());
    assert!(body.get("frequency_penalty").is_none());
    assert!(body.get("presence_penalty").is_none());
}

/// S6 — Anthropic mapping: `/v1/messages`, `x-api-key` auth, no
/// `frequency_penalty`/`presence_penalty`/`tools` on the wire, and
/// `usage.total_tokens` summed from `input_tokens` + `output_tokens`.
#[tokio::test]
async fn s6_anthropic_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "ok"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 2}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(
        ProviderConfig::new("anthropic", "sk-ant-test").with_base_url(server.uri()),
    )
    .unwrap();

    let response = provider
        .chat_completion(ChatRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![Message::system("be terse"), Message::user("hi")],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.choices[0].message.content, "ok");
    assert_eq!(response.usage.unwrap().total_tokens, 5);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert!(body.get("frequency_penalty").is_none());
    assert!(body.get("presence_penalty").is_none());
    assert!(body.get("tools").is_none());
}

/// Invariant 8: `health_check` updates `last_health_check` on every
/// invocation, regardless of whether the probe succeeds or fails.
#[tokio::test]
async fn health_check_updates_timestamp_on_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x", "object": "chat.completion", "created": 0, "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = OpenAIProvider::new(
        ProviderConfig::new("openai", "sk-test").with_base_url(server.uri()),
    )
    .unwrap();

    let healthy = provider.health_check().await.unwrap();
    assert!(healthy.last_check.timestamp() > 0);

    let unhealthy = provider.health_check().await.unwrap();
    assert!(unhealthy.last_check >= healthy.last_check);
}
