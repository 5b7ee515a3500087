//! Router configuration
//!
//! All tuning knobs live here: fallback strategy, per-attempt timeout, retry
//! backoff, circuit breaker thresholds, and cache sizing. Every config type
//! has a sensible `Default` and derives `Deserialize`, so a full
//! [`RouterConfig`] can be loaded from YAML or built in code.

use crate::types::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Selection and fallback strategy for ordering candidate providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Try exactly one provider; surface any failure immediately
    FailFast,
    /// Attempt providers in priority order until one succeeds
    #[default]
    TryAll,
    /// Rotate the starting candidate across calls, then fall back in order
    RoundRobin,
    /// Order candidates by ascending cost per unit
    CostOptimized,
}

impl FromStr for FallbackStrategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail_fast" => Ok(FallbackStrategy::FailFast),
            "try_all" => Ok(FallbackStrategy::TryAll),
            "round_robin" => Ok(FallbackStrategy::RoundRobin),
            "cost_optimized" => Ok(FallbackStrategy::CostOptimized),
            other => Err(RouterError::Configuration(format!(
                "unknown fallback strategy '{other}'"
            ))),
        }
    }
}

/// Static configuration for one registered provider
///
/// `name` is the provider's identity and must never change after
/// registration. `enabled` is the initial state of the runtime kill switch;
/// toggling it later goes through the router, not this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, used for routing and logging
    pub name: String,
    /// Selection priority; lower is preferred
    #[serde(default)]
    pub priority: u32,
    /// Cost per unit, used by the cost-optimized strategy
    #[serde(default)]
    pub cost_per_unit: f64,
    /// Advisory backend rate limit, requests per minute
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    /// Initial enabled state
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Logical model name to provider-specific model name. An empty map
    /// means the provider accepts any model name unchanged.
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
    /// API key forwarded to the adapter
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override forwarded to the adapter
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Create a config with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            cost_per_unit: 0.0,
            rate_limit_per_minute: None,
            enabled: true,
            model_aliases: HashMap::new(),
            api_key: None,
            api_base: None,
        }
    }

    /// Set the selection priority (lower = preferred)
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the cost per unit
    pub fn with_cost_per_unit(mut self, cost: f64) -> Self {
        self.cost_per_unit = cost;
        self
    }

    /// Add a logical-to-backend model alias
    pub fn with_model_alias(
        mut self,
        logical: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        self.model_aliases.insert(logical.into(), backend.into());
        self
    }

    /// Resolve a logical model name to this provider's model name
    ///
    /// Returns `None` when the provider does not serve the model. An empty
    /// alias map passes any name through unchanged; local validation is left
    /// to the backend.
    pub fn resolve_model(&self, model: &str) -> Option<String> {
        if self.model_aliases.is_empty() {
            Some(model.to_string())
        } else {
            self.model_aliases.get(model).cloned()
        }
    }

    /// Validate invariants that cannot be expressed in the type
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RouterError::Configuration(
                "provider name must not be empty".to_string(),
            ));
        }
        if self.cost_per_unit < 0.0 {
            return Err(RouterError::Configuration(format!(
                "provider '{}': cost_per_unit must be non-negative",
                self.name
            )));
        }
        Ok(())
    }
}

/// Retry and backoff tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per provider call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Exponential growth factor between attempts
    pub exponential_base: f64,
    /// Scale each delay by a uniform factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before admitting a probe
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Response cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long entries stay valid
    pub ttl: Duration,
    /// In-process tier entry limit; oldest-inserted entries are evicted first
    pub max_entries: usize,
    /// Disable to bypass the cache entirely
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            enabled: true,
        }
    }
}

/// Top-level router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Ordering and fallback algorithm
    pub fallback_strategy: FallbackStrategy,
    /// Provider used when the caller does not name one and the strategy
    /// needs a tiebreak
    pub default_provider: Option<String>,
    /// Per-attempt network timeout passed to each adapter call
    pub request_timeout: Option<Duration>,
    /// Retry policy tuning
    pub retry: RetryConfig,
    /// Circuit breaker tuning
    pub circuit_breaker: CircuitBreakerConfig,
    /// Response cache tuning
    pub cache: CacheConfig,
}

impl RouterConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RouterError::Configuration(format!("invalid YAML config: {e}")))
    }

    /// Load a configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RouterError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "fail_fast".parse::<FallbackStrategy>().unwrap(),
            FallbackStrategy::FailFast
        );
        assert_eq!(
            "cost_optimized".parse::<FallbackStrategy>().unwrap(),
            FallbackStrategy::CostOptimized
        );
        assert!("fastest".parse::<FallbackStrategy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.fallback_strategy, FallbackStrategy::TryAll);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.cache.max_entries, 1000);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_resolve_model_passthrough_when_no_aliases() {
        let config = ProviderConfig::new("openai");
        assert_eq!(config.resolve_model("gpt-4o"), Some("gpt-4o".to_string()));
    }

    #[test]
    fn test_resolve_model_with_aliases() {
        let config = ProviderConfig::new("anthropic")
            .with_model_alias("fast", "claude-3-5-haiku-latest");
        assert_eq!(
            config.resolve_model("fast"),
            Some("claude-3-5-haiku-latest".to_string())
        );
        assert_eq!(config.resolve_model("gpt-4o"), None);
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let config = ProviderConfig::new("x").with_cost_per_unit(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        assert!(ProviderConfig::new("").validate().is_err());
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
fallback_strategy: round_robin
default_provider: openai
retry:
  max_attempts: 5
  base_delay:
    secs: 1
    nanos: 0
  max_delay:
    secs: 10
    nanos: 0
  exponential_base: 2.0
  jitter: false
circuit_breaker:
  failure_threshold: 3
  reset_timeout:
    secs: 30
    nanos: 0
"#;
        let config = RouterConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.fallback_strategy, FallbackStrategy::RoundRobin);
        assert_eq!(config.default_provider.as_deref(), Some("openai"));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.retry.jitter);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        // Unspecified sections keep defaults
        assert_eq!(config.cache.max_entries, 1000);
    }

    #[test]
    fn test_from_yaml_str_rejects_garbage() {
        assert!(RouterConfig::from_yaml_str("fallback_strategy: [").is_err());
    }
}
