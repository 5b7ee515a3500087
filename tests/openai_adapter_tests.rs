//! OpenAI-compatible adapter against a mock HTTP backend

use futures::StreamExt;
use modelgate::{
    GenerationOptions, Message, OpenAiAdapter, OpenAiConfig, ProviderAdapter, RouterError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(server: &MockServer) -> OpenAiAdapter {
    OpenAiAdapter::new(OpenAiConfig {
        api_key: Some("sk-test".to_string()),
        api_base: Some(server.uri()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_generate_parses_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-abc",
            "model": "gpt-4o-mini-2024",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = adapter_for(&server)
        .generate(
            &[Message::user("hi")],
            "gpt-4o-mini",
            &GenerationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "Hello there");
    assert_eq!(response.model, "gpt-4o-mini-2024");
    assert_eq!(response.usage.total_units, 16);
    assert_eq!(response.provider, "openai");
}

#[tokio::test]
async fn test_429_maps_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_string("rate limit exceeded"),
        )
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .generate(&[Message::user("hi")], "gpt-4o", &GenerationOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::RateLimited { .. }));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_404_maps_to_model_not_available() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown model"))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .generate(
            &[Message::user("hi")],
            "nonexistent",
            &GenerationOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        RouterError::ModelNotAvailable { provider, model } => {
            assert_eq!(provider, "openai");
            assert_eq!(model, "nonexistent");
        }
        other => panic!("expected ModelNotAvailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_500_maps_to_retryable_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .generate(&[Message::user("hi")], "gpt-4o", &GenerationOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::Provider { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_stream_generate_yields_fragments() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"index\":0}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"index\":0}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"index\":0}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let mut stream = adapter_for(&server)
        .stream_generate(
            &[Message::user("hi")],
            "gpt-4o",
            &GenerationOptions::default(),
        )
        .await
        .unwrap();

    let mut collected = String::new();
    while let Some(fragment) = stream.next().await {
        collected.push_str(&fragment.unwrap());
    }
    assert_eq!(collected, "Hello world");
}

#[tokio::test]
async fn test_health_check_reflects_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    assert!(adapter_for(&server).health_check().await);

    let sick = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&sick)
        .await;
    assert!(!adapter_for(&sick).health_check().await);
}

#[tokio::test]
async fn test_list_models_parses_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]
        })))
        .mount(&server)
        .await;

    let models = adapter_for(&server).list_models().await.unwrap();
    assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]);
}
