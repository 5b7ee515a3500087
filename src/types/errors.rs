//! Error taxonomy
//!
//! Every failure the router can surface is a [`RouterError`]. The
//! classification that drives retry and fallback decisions lives here:
//! transient transport failures and rate limits are retryable, everything
//! else either skips the provider (`ModelNotAvailable`) or aborts the call
//! outright (`Validation`).

use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RouterError>;

/// One failed attempt against a provider, kept for aggregate diagnostics
#[derive(Debug)]
pub struct ProviderAttempt {
    /// Provider that was attempted
    pub provider: String,
    /// Rendered error for that attempt
    pub error: String,
}

/// Unified error type for router, adapters, retry, breaker, and cache
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Transport-level provider failure, generally retryable
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
    },

    /// Backend signaled throttling
    #[error("rate limited by provider '{provider}'")]
    RateLimited {
        provider: String,
        /// Backend-suggested wait, if it sent one
        retry_after: Option<Duration>,
    },

    /// Requested model is not served by this provider
    #[error("model '{model}' not available on provider '{provider}'")]
    ModelNotAvailable { provider: String, model: String },

    /// Caller-input problem, surfaced before any provider attempt
    #[error("validation error: {0}")]
    Validation(String),

    /// Per-attempt timeout elapsed
    #[error("request to provider '{provider}' timed out after {timeout:?}")]
    Timeout {
        provider: String,
        timeout: Duration,
    },

    /// Provider skipped because its circuit breaker is open
    #[error("circuit breaker is open for provider '{provider}'")]
    CircuitOpen { provider: String },

    /// Provider responded with something the adapter could not parse
    #[error("response parsing failed ({provider}): {message}")]
    ResponseParsing {
        provider: String,
        message: String,
    },

    /// Adapter does not implement streaming
    #[error("provider '{provider}' does not support streaming")]
    StreamingNotSupported { provider: String },

    /// Every eligible candidate was exhausted
    #[error("all providers failed ({} attempted); last error: {last}", attempts.len())]
    AllProvidersFailed {
        attempts: Vec<ProviderAttempt>,
        #[source]
        last: Box<RouterError>,
    },

    /// Caller named a provider the router does not know
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    /// Invalid router or provider configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RouterError {
    /// Whether the retry policy may re-attempt after this error
    ///
    /// Only transient transport failures, timeouts, and rate limits qualify.
    /// `CircuitOpen` triggers fallback, never a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::Provider { .. }
                | RouterError::RateLimited { .. }
                | RouterError::Timeout { .. }
        )
    }

    /// Backend-suggested retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RouterError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Provider the error originated from, when attributable
    pub fn provider(&self) -> Option<&str> {
        match self {
            RouterError::Provider { provider, .. }
            | RouterError::RateLimited { provider, .. }
            | RouterError::ModelNotAvailable { provider, .. }
            | RouterError::Timeout { provider, .. }
            | RouterError::CircuitOpen { provider }
            | RouterError::ResponseParsing { provider, .. }
            | RouterError::StreamingNotSupported { provider } => Some(provider),
            _ => None,
        }
    }

    /// Shorthand for a transport failure
    pub fn provider_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        RouterError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a parse failure
    pub fn parsing(provider: impl Into<String>, message: impl Into<String>) -> Self {
        RouterError::ResponseParsing {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RouterError::provider_error("a", "boom").is_retryable());
        assert!(
            RouterError::RateLimited {
                provider: "a".into(),
                retry_after: None
            }
            .is_retryable()
        );
        assert!(
            RouterError::Timeout {
                provider: "a".into(),
                timeout: Duration::from_secs(5)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(
            !RouterError::ModelNotAvailable {
                provider: "a".into(),
                model: "m".into()
            }
            .is_retryable()
        );
        assert!(!RouterError::Validation("empty messages".into()).is_retryable());
        assert!(!RouterError::CircuitOpen { provider: "a".into() }.is_retryable());
        assert!(!RouterError::parsing("a", "bad json").is_retryable());
    }

    #[test]
    fn test_retry_after_passthrough() {
        let err = RouterError::RateLimited {
            provider: "a".into(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert!(RouterError::Validation("x".into()).retry_after().is_none());
    }

    #[test]
    fn test_aggregate_error_display() {
        let err = RouterError::AllProvidersFailed {
            attempts: vec![
                ProviderAttempt {
                    provider: "a".into(),
                    error: "boom".into(),
                },
                ProviderAttempt {
                    provider: "b".into(),
                    error: "bang".into(),
                },
            ],
            last: Box::new(RouterError::provider_error("b", "bang")),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("2 attempted"));
        assert!(rendered.contains("bang"));
    }

    #[test]
    fn test_provider_attribution() {
        let err = RouterError::CircuitOpen { provider: "x".into() };
        assert_eq!(err.provider(), Some("x"));
        assert!(RouterError::Validation("v".into()).provider().is_none());
    }
}
