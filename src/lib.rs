//! # modelgate
//!
//! A resilient request router over multiple generative-model backends.
//! One [`Router`] fronts any number of [`ProviderAdapter`]s and drives every
//! call through the same pipeline: response cache, candidate selection by
//! fallback strategy, bounded retry with exponential backoff, and a
//! per-provider circuit breaker that isolates failing backends.
//!
//! ## Quick start
//!
//! ```no_run
//! use modelgate::{
//!     GenerationOptions, Message, OpenAiAdapter, OpenAiConfig, ProviderConfig, Router,
//!     RouterConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> modelgate::Result<()> {
//! let adapter = OpenAiAdapter::new(OpenAiConfig {
//!     api_key: std::env::var("OPENAI_API_KEY").ok(),
//!     ..Default::default()
//! })?;
//!
//! let router = Router::builder(RouterConfig::default())
//!     .register(ProviderConfig::new("openai"), Arc::new(adapter))
//!     .build()?;
//!
//! let response = router
//!     .generate(
//!         &[Message::user("Say hello.")],
//!         "gpt-4o-mini",
//!         &GenerationOptions::default().with_max_units(64),
//!     )
//!     .await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layering
//!
//! - [`providers`] — the adapter trait plus OpenAI-compatible and Anthropic
//!   implementations, with shared SSE streaming plumbing.
//! - [`retry`] — bounded exponential backoff around a single provider call.
//! - [`breaker`] — per-provider circuit breaker with single-probe recovery.
//! - [`cache`] — deterministic-key response cache with TTL and FIFO
//!   eviction, optionally backed by an external store.
//! - [`router`] — orchestration and cross-provider fallback.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod providers;
pub mod retry;
pub mod router;
pub mod stats;
pub mod types;

pub use breaker::{BreakerPermit, CircuitBreaker, CircuitState};
pub use cache::{CacheKey, CacheStats, CacheStore, ResponseCache};
pub use config::{
    CacheConfig, CircuitBreakerConfig, FallbackStrategy, ProviderConfig, RetryConfig, RouterConfig,
};
pub use providers::{
    AnthropicAdapter, Capability, OpenAiAdapter, ProviderAdapter, TextStream,
    anthropic::AnthropicConfig, openai::OpenAiConfig,
};
pub use retry::RetryPolicy;
pub use router::{Router, RouterBuilder};
pub use stats::{ProviderStats, UsageStats};
pub use types::{
    GenerationOptions, Message, ModelResponse, ProviderAttempt, Result, Role, RouterError, Usage,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
