//! Request router with fallback, retry, breaker, and cache orchestration
//!
//! The [`Router`] owns every registered provider together with its circuit
//! breaker and usage counters, and drives a call through the layers in a
//! fixed order: cache lookup, candidate selection, per-provider retry with
//! breaker admission, cache write-through on success. Cross-provider
//! fallback happens here and only here; the retry policy below never spans
//! providers.

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::cache::{CacheKey, CacheStats, CacheStore, ResponseCache};
use crate::config::{FallbackStrategy, ProviderConfig, RouterConfig};
use crate::providers::{ProviderAdapter, TextStream};
use crate::retry::RetryPolicy;
use crate::stats::{ProviderStats, UsageStats};
use crate::types::{
    GenerationOptions, Message, ModelResponse, ProviderAttempt, Result, RouterError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{Instrument, debug, debug_span, info, warn};
use uuid::Uuid;

struct ProviderEntry {
    config: ProviderConfig,
    adapter: Arc<dyn ProviderAdapter>,
    breaker: CircuitBreaker,
    stats: ProviderStats,
    enabled: AtomicBool,
}

impl ProviderEntry {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Builder for [`Router`]
///
/// Collects providers and validates the whole set at [`build`](Self::build)
/// time: every provider config must pass validation and names must be
/// unique.
pub struct RouterBuilder {
    config: RouterConfig,
    providers: Vec<(ProviderConfig, Arc<dyn ProviderAdapter>)>,
    store: Option<Arc<dyn CacheStore>>,
}

impl RouterBuilder {
    /// Start a builder from a router configuration
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            store: None,
        }
    }

    /// Register a provider with its adapter
    ///
    /// Registration order is the tiebreak when priorities are equal.
    pub fn register(
        mut self,
        config: ProviderConfig,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.providers.push((config, adapter));
        self
    }

    /// Attach a durable second cache tier
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and assemble the router
    pub fn build(self) -> Result<Router> {
        if self.providers.is_empty() {
            return Err(RouterError::Configuration(
                "router requires at least one provider".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for (config, _) in &self.providers {
            config.validate()?;
            if !seen.insert(config.name.clone()) {
                return Err(RouterError::Configuration(format!(
                    "duplicate provider name '{}'",
                    config.name
                )));
            }
        }
        if let Some(default) = &self.config.default_provider {
            if !seen.contains(default) {
                return Err(RouterError::Configuration(format!(
                    "default_provider '{default}' is not registered"
                )));
            }
        }

        let breaker_config = self.config.circuit_breaker.clone();
        let entries = self
            .providers
            .into_iter()
            .map(|(config, adapter)| ProviderEntry {
                breaker: CircuitBreaker::new(config.name.clone(), breaker_config.clone()),
                stats: ProviderStats::default(),
                enabled: AtomicBool::new(config.enabled),
                config,
                adapter,
            })
            .collect();

        let mut cache = ResponseCache::new(self.config.cache.clone());
        if let Some(store) = self.store {
            cache = cache.with_store(store);
        }

        Ok(Router {
            retry: RetryPolicy::new(self.config.retry.clone()),
            cache,
            providers: entries,
            round_robin: AtomicUsize::new(0),
            config: self.config,
        })
    }
}

/// Unified entry point over all registered providers
pub struct Router {
    config: RouterConfig,
    providers: Vec<ProviderEntry>,
    retry: RetryPolicy,
    cache: ResponseCache,
    round_robin: AtomicUsize,
}

impl Router {
    /// Start building a router
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// Execute a completion request with caching, fallback, retry, and
    /// breaker protection
    pub async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        self.validate_request(messages, model)?;
        let request_id = Uuid::new_v4();
        let span = debug_span!("generate", %request_id, model);
        self.generate_inner(messages, model, options).instrument(span).await
    }

    async fn generate_inner(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        let key = CacheKey::compute(messages, model, options);
        if let Some(response) = self.cache.get(&key).await {
            return Ok(response);
        }

        let candidates = self.candidates(model)?;
        let fail_fast = self.config.fallback_strategy == FallbackStrategy::FailFast;
        let mut attempts = Vec::new();
        let mut last_error = None;

        for index in candidates {
            let entry = &self.providers[index];
            match self.call_entry(entry, messages, model, options).await {
                Ok(response) => {
                    self.cache.set(key.clone(), response.clone()).await;
                    return Ok(response);
                }
                Err(err) => {
                    // An open-circuit skip never reached the provider and is
                    // not an error of it; only real call failures count.
                    if !matches!(err, RouterError::CircuitOpen { .. }) {
                        entry.stats.record_error();
                    }
                    warn!(provider = %entry.name(), error = %err, "provider attempt failed");
                    if fail_fast {
                        return Err(err);
                    }
                    attempts.push(ProviderAttempt {
                        provider: entry.name().to_string(),
                        error: err.to_string(),
                    });
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(last) => Err(RouterError::AllProvidersFailed {
                attempts,
                last: Box::new(last),
            }),
            // Unreachable: candidates() guarantees a non-empty list.
            None => Err(RouterError::Configuration(
                "no candidate was attempted".to_string(),
            )),
        }
    }

    /// Execute a completion request against one named provider
    ///
    /// Fail-fast semantics: no fallback, and the cache is bypassed so the
    /// caller is guaranteed to reach the provider they named.
    pub async fn generate_on(
        &self,
        provider: &str,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        self.validate_request(messages, model)?;
        let entry = self.entry(provider)?;
        if !entry.is_enabled() {
            return Err(RouterError::ProviderNotFound(format!(
                "{provider} (disabled)"
            )));
        }
        if entry.config.resolve_model(model).is_none() {
            return Err(RouterError::ModelNotAvailable {
                provider: provider.to_string(),
                model: model.to_string(),
            });
        }
        let request_id = Uuid::new_v4();
        let span = debug_span!("generate_on", %request_id, provider, model);
        async {
            let result = self.call_entry(entry, messages, model, options).await;
            if let Err(err) = &result {
                if !matches!(err, RouterError::CircuitOpen { .. }) {
                    entry.stats.record_error();
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Open a streaming completion
    ///
    /// Retry and fallback cover stream establishment only; once a stream is
    /// handed back, mid-stream failures surface as items on the stream and
    /// are not re-routed. Streaming responses are never cached.
    pub async fn stream_generate(
        &self,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        self.validate_request(messages, model)?;
        let request_id = Uuid::new_v4();
        let span = debug_span!("stream_generate", %request_id, model);
        async {
            let candidates = self.candidates(model)?;
            let fail_fast = self.config.fallback_strategy == FallbackStrategy::FailFast;
            let mut attempts = Vec::new();
            let mut last_error = None;

            for index in candidates {
                let entry = &self.providers[index];
                if !entry.adapter.supports_streaming() {
                    let err = RouterError::StreamingNotSupported {
                        provider: entry.name().to_string(),
                    };
                    if fail_fast {
                        return Err(err);
                    }
                    attempts.push(ProviderAttempt {
                        provider: entry.name().to_string(),
                        error: err.to_string(),
                    });
                    last_error = Some(err);
                    continue;
                }
                match self.open_stream(entry, messages, model, options).await {
                    Ok(stream) => return Ok(stream),
                    Err(err) => {
                        if !matches!(err, RouterError::CircuitOpen { .. }) {
                            entry.stats.record_error();
                        }
                        warn!(provider = %entry.name(), error = %err, "stream attempt failed");
                        if fail_fast {
                            return Err(err);
                        }
                        attempts.push(ProviderAttempt {
                            provider: entry.name().to_string(),
                            error: err.to_string(),
                        });
                        last_error = Some(err);
                    }
                }
            }

            match last_error {
                Some(last) => Err(RouterError::AllProvidersFailed {
                    attempts,
                    last: Box::new(last),
                }),
                None => Err(RouterError::Configuration(
                    "no candidate was attempted".to_string(),
                )),
            }
        }
        .instrument(span)
        .await
    }

    /// Probe every registered provider concurrently
    ///
    /// Disabled providers are probed too; the caller can cross-reference
    /// with the enabled flag if needed.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let checks = self.providers.iter().map(|entry| async {
            let healthy = entry.adapter.health_check().await;
            (entry.name().to_string(), healthy)
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }

    /// Usage counter snapshot for every provider
    pub fn usage_stats(&self) -> HashMap<String, UsageStats> {
        self.providers
            .iter()
            .map(|entry| (entry.name().to_string(), entry.stats.snapshot()))
            .collect()
    }

    /// Zero every provider's usage counters
    pub fn reset_stats(&self) {
        for entry in &self.providers {
            entry.stats.reset();
        }
    }

    /// Runtime kill switch for one provider
    ///
    /// Takes effect for subsequent calls; in-flight calls finish normally.
    pub fn set_provider_enabled(&self, provider: &str, enabled: bool) -> Result<()> {
        let entry = self.entry(provider)?;
        entry.enabled.store(enabled, Ordering::Relaxed);
        info!(provider, enabled, "provider enabled state changed");
        Ok(())
    }

    /// Circuit state of one provider's breaker
    pub fn circuit_state(&self, provider: &str) -> Result<CircuitState> {
        Ok(self.entry(provider)?.breaker.state())
    }

    /// Force one provider's breaker back to Closed
    pub fn reset_circuit(&self, provider: &str) -> Result<()> {
        self.entry(provider)?.breaker.reset();
        Ok(())
    }

    /// Names of all registered providers, in registration order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    /// Cache hit/miss/eviction counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn validate_request(&self, messages: &[Message], model: &str) -> Result<()> {
        if messages.is_empty() {
            return Err(RouterError::Validation(
                "messages must not be empty".to_string(),
            ));
        }
        if model.is_empty() {
            return Err(RouterError::Validation(
                "model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn entry(&self, provider: &str) -> Result<&ProviderEntry> {
        self.providers
            .iter()
            .find(|entry| entry.name() == provider)
            .ok_or_else(|| RouterError::ProviderNotFound(provider.to_string()))
    }

    /// Indices of eligible providers in attempt order
    ///
    /// Eligibility: enabled and serving the requested model. Ordering is the
    /// strategy's: priority for try_all, a rotating start for round_robin,
    /// ascending cost for cost_optimized, and the single best candidate for
    /// fail_fast (the default provider when configured, lowest priority
    /// otherwise).
    fn candidates(&self, model: &str) -> Result<Vec<usize>> {
        let mut eligible: Vec<usize> = self
            .providers
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.is_enabled() && entry.config.resolve_model(model).is_some()
            })
            .map(|(i, _)| i)
            .collect();
        if eligible.is_empty() {
            return Err(RouterError::Validation(format!(
                "no enabled provider serves model '{model}'"
            )));
        }

        // Stable sort keeps registration order as the tiebreak.
        eligible.sort_by_key(|&i| self.providers[i].config.priority);

        match self.config.fallback_strategy {
            FallbackStrategy::TryAll => {}
            FallbackStrategy::FailFast => {
                if let Some(default) = &self.config.default_provider {
                    if let Some(pos) = eligible
                        .iter()
                        .position(|&i| self.providers[i].name() == default)
                    {
                        eligible.swap(0, pos);
                    }
                }
                eligible.truncate(1);
            }
            FallbackStrategy::RoundRobin => {
                let start = self.round_robin.fetch_add(1, Ordering::Relaxed) % eligible.len();
                eligible.rotate_left(start);
            }
            FallbackStrategy::CostOptimized => {
                eligible.sort_by(|&a, &b| {
                    let ca = self.providers[a].config.cost_per_unit;
                    let cb = self.providers[b].config.cost_per_unit;
                    ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        debug!(
            model,
            order = ?eligible.iter().map(|&i| self.providers[i].name()).collect::<Vec<_>>(),
            "candidate order"
        );
        Ok(eligible)
    }

    /// One provider's breaker-gated, retried, timed call
    ///
    /// The breaker admits or rejects the call as a whole; retries happen
    /// inside the admission, so a provider-level call notifies the breaker
    /// exactly once with its final outcome. A permit dropped by caller
    /// cancellation resolves as neither success nor failure.
    async fn call_entry(
        &self,
        entry: &ProviderEntry,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        // resolve_model was checked during candidate selection.
        let backend_model = entry.config.resolve_model(model).ok_or_else(|| {
            RouterError::ModelNotAvailable {
                provider: entry.name().to_string(),
                model: model.to_string(),
            }
        })?;

        let Some(permit) = entry.breaker.try_acquire() else {
            debug!(provider = %entry.name(), "skipped, circuit open");
            return Err(RouterError::CircuitOpen {
                provider: entry.name().to_string(),
            });
        };

        let result = self
            .retry
            .execute(|| self.attempt_once(entry, messages, &backend_model, options))
            .await;
        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }
        result
    }

    /// A single timed adapter attempt; success is recorded here so latency
    /// covers the attempt that produced the response, not backoff sleeps
    async fn attempt_once(
        &self,
        entry: &ProviderEntry,
        messages: &[Message],
        backend_model: &str,
        options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        let start = Instant::now();
        let call = entry.adapter.generate(messages, backend_model, options);
        let result = match self.config.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(RouterError::Timeout {
                    provider: entry.name().to_string(),
                    timeout,
                }),
            },
            None => call.await,
        };
        if let Ok(response) = &result {
            entry
                .stats
                .record_success(response.usage.total_units, start.elapsed());
        }
        result
    }

    async fn open_stream(
        &self,
        entry: &ProviderEntry,
        messages: &[Message],
        model: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        let backend_model = entry.config.resolve_model(model).ok_or_else(|| {
            RouterError::ModelNotAvailable {
                provider: entry.name().to_string(),
                model: model.to_string(),
            }
        })?;

        let Some(permit) = entry.breaker.try_acquire() else {
            debug!(provider = %entry.name(), "skipped, circuit open");
            return Err(RouterError::CircuitOpen {
                provider: entry.name().to_string(),
            });
        };

        let result = self
            .retry
            .execute(|| async {
                let start = Instant::now();
                let call = entry.adapter.stream_generate(messages, &backend_model, options);
                let result = match self.config.request_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(RouterError::Timeout {
                            provider: entry.name().to_string(),
                            timeout,
                        }),
                    },
                    None => call.await,
                };
                if result.is_ok() {
                    // Unit counts are unknown for streams; the call still
                    // counts toward request accounting.
                    entry.stats.record_success(0, start.elapsed());
                }
                result
            })
            .await;
        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Capability;
    use crate::types::Usage;
    use async_trait::async_trait;
    use chrono::Utc;

    #[derive(Debug)]
    struct NullAdapter(&'static str);

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        fn name(&self) -> &str {
            self.0
        }
        fn capabilities(&self) -> &[Capability] {
            &[Capability::Generate]
        }
        async fn generate(
            &self,
            _messages: &[Message],
            model: &str,
            _options: &GenerationOptions,
        ) -> Result<ModelResponse> {
            Ok(ModelResponse {
                content: "ok".to_string(),
                model: model.to_string(),
                usage: Usage::new(1, 1),
                provider: self.0.to_string(),
                created: Utc::now(),
                raw_metadata: HashMap::new(),
            })
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn register(builder: RouterBuilder, name: &'static str) -> RouterBuilder {
        builder.register(ProviderConfig::new(name), Arc::new(NullAdapter(name)))
    }

    #[test]
    fn test_build_requires_providers() {
        let Err(err) = Router::builder(RouterConfig::default()).build() else {
            panic!("build must fail without providers");
        };
        assert!(matches!(err, RouterError::Configuration(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let builder = register(register(Router::builder(RouterConfig::default()), "a"), "a");
        assert!(matches!(
            builder.build(),
            Err(RouterError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_rejects_unknown_default_provider() {
        let config = RouterConfig {
            default_provider: Some("ghost".to_string()),
            ..RouterConfig::default()
        };
        let builder = register(Router::builder(config), "a");
        assert!(matches!(
            builder.build(),
            Err(RouterError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_input() {
        let router = register(Router::builder(RouterConfig::default()), "a")
            .build()
            .unwrap();
        let err = router
            .generate(&[], "m", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Validation(_)));
        let err = router
            .generate(&[Message::user("hi")], "", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_name_errors() {
        let router = register(Router::builder(RouterConfig::default()), "a")
            .build()
            .unwrap();
        let err = router
            .generate_on("ghost", &[Message::user("hi")], "m", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ProviderNotFound(_)));
        assert!(router.circuit_state("ghost").is_err());
    }

    #[tokio::test]
    async fn test_no_candidate_for_model() {
        let config = ProviderConfig::new("a").with_model_alias("served", "backend-served");
        let router = Router::builder(RouterConfig::default())
            .register(config, Arc::new(NullAdapter("a")))
            .build()
            .unwrap();
        let err = router
            .generate(&[Message::user("hi")], "other", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Validation(_)));
    }

    #[test]
    fn test_provider_names_in_registration_order() {
        let router = register(register(Router::builder(RouterConfig::default()), "b"), "a")
            .build()
            .unwrap();
        assert_eq!(router.provider_names(), vec!["b", "a"]);
    }
}
