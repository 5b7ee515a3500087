//! Shared test fixtures: a scripted provider adapter with call accounting

use async_trait::async_trait;
use chrono::Utc;
use modelgate::providers::Capability;
use modelgate::{
    GenerationOptions, Message, ModelResponse, ProviderAdapter, Result, RouterError, Usage,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Outcome of one scripted call
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Return a well-formed response
    Succeed,
    /// Fail with a retryable transport error
    Transport,
    /// Fail with a retryable rate limit
    RateLimit,
    /// Fail with a fatal model-not-available error
    ModelMissing,
    /// Sleep before succeeding, to trip per-attempt timeouts
    Slow(Duration),
}

/// Adapter whose behavior is a queue of scripted outcomes
///
/// When the script runs out, the fallback outcome repeats. Every `generate`
/// invocation is counted, including ones that fail.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: &'static str,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new(name: &'static str, script: Vec<Outcome>, fallback: Outcome) -> Self {
        Self {
            name,
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Adapter that always succeeds
    pub fn succeeding(name: &'static str) -> Self {
        Self::new(name, Vec::new(), Outcome::Succeed)
    }

    /// Adapter that always fails the given way
    pub fn failing(name: &'static str, outcome: Outcome) -> Self {
        Self::new(name, Vec::new(), outcome)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }

    fn error_for(&self, outcome: Outcome) -> RouterError {
        match outcome {
            Outcome::Transport => RouterError::Provider {
                provider: self.name.to_string(),
                message: "connection reset".to_string(),
            },
            Outcome::RateLimit => RouterError::RateLimited {
                provider: self.name.to_string(),
                retry_after: None,
            },
            Outcome::ModelMissing => RouterError::ModelNotAvailable {
                provider: self.name.to_string(),
                model: "scripted".to_string(),
            },
            Outcome::Succeed | Outcome::Slow(_) => unreachable!("not an error outcome"),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Generate, Capability::HealthCheck]
    }

    async fn generate(
        &self,
        _messages: &[Message],
        model: &str,
        _options: &GenerationOptions,
    ) -> Result<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.next_outcome();
        if let Outcome::Slow(delay) = outcome {
            tokio::time::sleep(delay).await;
        }
        match outcome {
            Outcome::Succeed | Outcome::Slow(_) => Ok(ModelResponse {
                content: format!("response from {}", self.name),
                model: model.to_string(),
                usage: Usage::new(10, 5),
                provider: self.name.to_string(),
                created: Utc::now(),
                raw_metadata: HashMap::new(),
            }),
            other => Err(self.error_for(other)),
        }
    }

    async fn health_check(&self) -> bool {
        matches!(self.fallback, Outcome::Succeed)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted".to_string()])
    }
}
