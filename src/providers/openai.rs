//! OpenAI-compatible backend adapter
//!
//! Speaks the `/chat/completions` + `/models` dialect, which a number of
//! hosted backends expose. Point `api_base` elsewhere to use any of them.

use super::sse::{SseFragmenter, SseTextStream};
use super::{Capability, ProviderAdapter, TextStream, map_status_error, parse_retry_after};
use crate::types::{GenerationOptions, Message, ModelResponse, Result, RouterError, Usage};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for [`OpenAiAdapter`]
#[derive(Debug, Clone, Default)]
pub struct OpenAiConfig {
    /// Bearer token
    pub api_key: Option<String>,
    /// Base URL; defaults to the hosted OpenAI endpoint
    pub api_base: Option<String>,
    /// Optional organization header
    pub organization: Option<String>,
    /// Connect/read timeout applied to the underlying HTTP client
    pub http_timeout: Option<Duration>,
}

/// Adapter for OpenAI-compatible backends
#[derive(Debug)]
pub struct OpenAiAdapter {
    name: String,
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiAdapter {
    /// Create an adapter named `openai`
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Self::with_name("openai", config)
    }

    /// Create an adapter under a custom provider name
    ///
    /// Useful when several OpenAI-compatible backends are registered side by
    /// side under different names.
    pub fn with_name(name: impl Into<String>, config: OpenAiConfig) -> Result<Self> {
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
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
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
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        let mut body = json!({
            "model": model,
            "messages": wire_messages,
        });
        if let Some(max_units) = options.max_units {
            body["max_tokens"] = json!(max_units);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &options.stop {
            body["stop"] = json!(stop);
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = value.clone();
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base());
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
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| RouterError::parsing(&self.name, "missing choices[0].message.content"))?
            .to_string();
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let prompt_units = value
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion_units = value
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut raw_metadata = HashMap::new();
        for field in ["id", "created", "system_fingerprint"] {
            if let Some(v) = value.get(field) {
                raw_metadata.insert(field.to_string(), v.clone());
            }
        }
        if let Some(finish) = value.pointer("/choices/0/finish_reason") {
            raw_metadata.insert("finish_reason".to_string(), finish.clone());
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

/// Extracts `choices[0].delta.content` from each SSE payload
struct OpenAiFragmenter {
    provider: String,
}

impl SseFragmenter for OpenAiFragmenter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn fragment(&self, data: &str) -> Result<Option<String>> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| RouterError::parsing(&self.provider, format!("bad SSE JSON: {e}")))?;
        Ok(value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
        let fragmenter = OpenAiFragmenter {
            provider: self.name.clone(),
        };
        Ok(Box::pin(SseTextStream::new(
            Box::pin(response.bytes_stream()),
            fragmenter,
        )))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.api_base());
        match self.request(reqwest::Method::GET, &url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.api_base());
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
