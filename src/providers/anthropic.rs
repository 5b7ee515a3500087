//! Anthropic Messages API adapter
//!
//! Differences from the OpenAI dialect that matter here: system messages
//! travel as a top-level `system` field rather than in the message list,
//! `max_tokens` is mandatory, auth uses `x-api-key`, and streamed text
//! arrives as `content_block_delta` events instead of choice deltas.

use super::sse::{SseFragmenter, SseTextStream};
use super::{Capability, ProviderAdapter, TextStream, map_status_error, parse_retry_after};
use crate::types::{GenerationOptions, Message, ModelResponse, Result, Role, RouterError, Usage};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_UNITS: u32 = 4096;

/// Configuration for [`AnthropicAdapter`]
#[derive(Debug, Clone, Default)]
pub struct AnthropicConfig {
    /// API key sent in the `x-api-key` header
    pub api_key: Option<String>,
    /// Base URL; defaults to the hosted Anthropic endpoint
    pub api_base: Option<String>,
    /// Connect/read timeout applied to the underlying HTTP client
    pub http_timeout: Option<Duration>,
}

/// Adapter for the Anthropic Messages API
#[derive(Debug)]
pub struct AnthropicAdapter {
    name: String,
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicAdapter {
    /// Create an adapter named `anthropic`
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        Self::with_name("anthropic", config)
    }

    /// Create an adapter under a custom provider name
    pub fn with_name(name: impl Into<String>, config: AnthropicConfig) -> Result<Self> {
        let name = name.into();
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            RouterError::Configuration(format!("failed to build HTTP client for '{name}': {e}"))
        })?;
        Ok(Self {
            name,
            client,
            config,
        })
    }

    fn api_base(&self) -> &str {
        self.config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .header("anthropic-version", API_VERSION);
        if let Some(key) = &self.config.api_key {
            req = req.header("x-api-key", key);
        }
        req
    }

    fn build_body(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> Value {
        // System turns are hoisted out of the conversation; multiple system
        // messages are joined in order.
        let mut system_parts = Vec::new();
        let mut wire_messages = Vec::new();
        for m in messages {
            match m.role {
                Role::System => system_parts.push(m.content.as_str()),
                _ => wire_messages.push(json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })),
            }
        }

        let mut body = json!({
            "model": model,
            "messages": wire_messages,
            "max_tokens": options.max_units.unwrap_or(DEFAULT_MAX_UNITS),
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &options.stop {
            body["stop_sequences"] = json!(stop);
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = value.clone();
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, model: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.api_base());
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(body)
            .send()
            .await
            .map_err(|e| RouterError::provider_error(&self.name, format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        Err(map_status_error(&self.name, model, status, &text, retry_after))
    }

    fn parse_response(&self, value: Value) -> Result<ModelResponse> {
        // Text blocks are concatenated; non-text blocks are skipped.
        let blocks = value
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| RouterError::parsing(&self.name, "missing content blocks"))?;
        let content = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let prompt_units = value
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion_units = value
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut raw_metadata = HashMap::new();
        for field in ["id", "stop_reason", "stop_sequence"] {
            if let Some(v) = value.get(field) {
                if !v.is_null() {
                    raw_metadata.insert(field.to_string(), v.clone());
                }
            }
        }

        Ok(ModelResponse {
            content,
            model,
            usage: Usage::new(prompt_units, completion_units),
            provider: self.name.clone(),
            created: Utc::now(),
            raw_metadata,
        })
    }
}

/// Extracts text from `content_block_delta` events
///
/// The Messages stream signals completion with a `message_stop` event, not
/// a `[DONE]` sentinel.
struct AnthropicFragmenter {
    provider: String,
}

impl SseFragmenter for AnthropicFragmenter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn is_end_marker(&self, data: &str) -> bool {
        serde_json::from_str::<Value>(data)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
            .is_some_and(|t| t == "message_stop")
    }

    fn fragment(&self, data: &str) -> Result<Option<String>> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| RouterError::parsing(&self.provider, format!("bad SSE JSON: {e}")))?;
        if value.get("type").and_then(Value::as_str) != Some("content_block_delta") {
            return Ok(None);
        }
        Ok(value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::Generate,
            Capability::StreamGenerate,
            Capability::HealthCheck,
            Capability::ListModels,
        ]
    }

    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        let body = self.build_body(messages, model, options, false);
        debug!(provider = %self.name, model, "sending completion request");
        let response = self.send(model, &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| RouterError::parsing(&self.name, format!("invalid JSON body: {e}")))?;
        self.parse_response(value)
    }

    async fn stream_generate(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        let body = self.build_body(messages, model, options, true);
        debug!(provider = %self.name, model, "opening completion stream");
        let response = self.send(model, &body).await?;
        let fragmenter = AnthropicFragmenter {
            provider: self.name.clone(),
        };
        Ok(Box::pin(SseTextStream::new(
            Box::pin(response.bytes_stream()),
            fragmenter,
        )))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.api_base());
        match self.request(reqwest::Method::GET, &url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.api_base());
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| RouterError::provider_error(&self.name, format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(&self.name, "", status, &text, None));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| RouterError::parsing(&self.name, format!("invalid JSON body: {e}")))?;
        let models = value
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}
