//! Provider adapters
//!
//! A [`ProviderAdapter`] translates the uniform request/response contract to
//! one backend family's native protocol. Adapters are stateless beyond their
//! HTTP client and never touch shared router state; failure isolation,
//! retry, caching, and accounting all live above them.

pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

use crate::types::{GenerationOptions, Message, ModelResponse, Result, RouterError};
use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;

/// Capabilities a provider adapter can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Synchronous completion
    Generate,
    /// Incremental fragment streaming
    StreamGenerate,
    /// Liveness probing
    HealthCheck,
    /// Model-list endpoint
    ListModels,
}

/// Lazy, finite, non-restartable sequence of text fragments
///
/// Dropping the stream before exhaustion cancels the underlying HTTP
/// response and releases the connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Uniform contract over heterogeneous backends
#[async_trait]
pub trait ProviderAdapter: Send + Sync + Debug {
    /// Provider name; must match the registered [`crate::config::ProviderConfig`]
    fn name(&self) -> &str;

    /// Capability set supported by this adapter
    fn capabilities(&self) -> &[Capability];

    /// Execute a completion request
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse>;

    /// Execute a streaming completion request
    ///
    /// Fragments are yielded as the backend produces them. The consumer may
    /// stop at any time by dropping the stream.
    async fn stream_generate(
        &self,
        _messages: &[Message],
        _model: &str,
        _options: &GenerationOptions,
    ) -> Result<TextStream> {
        Err(RouterError::StreamingNotSupported {
            provider: self.name().to_string(),
        })
    }

    /// Probe backend liveness; never raises, failures report `false`
    async fn health_check(&self) -> bool;

    /// List models the backend advertises
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Whether streaming is available
    fn supports_streaming(&self) -> bool {
        self.capabilities().contains(&Capability::StreamGenerate)
    }
}

/// Map an HTTP error status to the router taxonomy
///
/// Shared by the concrete adapters so every backend reports the same error
/// shapes: 429 is a rate limit, 404 and model-shaped 400s are
/// model-not-available, other 4xx are validation, 5xx are transport.
pub(crate) fn map_status_error(
    provider: &str,
    model: &str,
    status: reqwest::StatusCode,
    body: &str,
    retry_after: Option<std::time::Duration>,
) -> RouterError {
    match status.as_u16() {
        429 => RouterError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        404 => RouterError::ModelNotAvailable {
            provider: provider.to_string(),
            model: model.to_string(),
        },
        400 if body.contains("model") && body.contains("not") => RouterError::ModelNotAvailable {
            provider: provider.to_string(),
            model: model.to_string(),
        },
        s if (400..500).contains(&s) => RouterError::Validation(format!(
            "provider '{provider}' rejected the request (HTTP {s}): {body}"
        )),
        s => RouterError::provider_error(provider, format!("HTTP {s}: {body}")),
    }
}

/// Parse a `Retry-After` header value in seconds
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<std::time::Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}
