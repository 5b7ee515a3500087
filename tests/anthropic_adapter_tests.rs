//! Anthropic adapter against a mock HTTP backend

use futures::StreamExt;
use modelgate::{
    AnthropicAdapter, AnthropicConfig, GenerationOptions, Message, ProviderAdapter, RouterError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(server: &MockServer) -> AnthropicAdapter {
    AnthropicAdapter::new(AnthropicConfig {
        api_key: Some("sk-ant-test".to_string()),
        api_base: Some(server.uri()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_generate_parses_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header_exists("anthropic-version"))
        .and(body_partial_json(json!({"system": "be terse"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_abc",
            "model": "claude-3-5-haiku-20241022",
            "content": [{"type": "text", "text": "Hi."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 8, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = adapter_for(&server)
        .generate(
            &[Message::system("be terse"), Message::user("hello")],
            "claude-3-5-haiku-latest",
            &GenerationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "Hi.");
    assert_eq!(response.usage.total_units, 10);
    assert_eq!(response.provider, "anthropic");
}

#[tokio::test]
async fn test_429_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .generate(
            &[Message::user("hi")],
            "claude-3-5-haiku-latest",
            &GenerationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::RateLimited { .. }));
}

#[tokio::test]
async fn test_stream_generate_yields_text_deltas() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let mut stream = adapter_for(&server)
        .stream_generate(
            &[Message::user("hi")],
            "claude-3-5-haiku-latest",
            &GenerationOptions::default(),
        )
        .await
        .unwrap();

    let mut collected = String::new();
    while let Some(fragment) = stream.next().await {
        collected.push_str(&fragment.unwrap());
    }
    assert_eq!(collected, "Hello");
}
