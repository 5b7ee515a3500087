//! Uniform response and request-option types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Unit accounting for a single completed call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Units consumed by the prompt
    pub prompt_units: u64,
    /// Units consumed by the completion
    pub completion_units: u64,
    /// Total units consumed
    pub total_units: u64,
}

impl Usage {
    /// Build usage from prompt and completion counts
    pub fn new(prompt_units: u64, completion_units: u64) -> Self {
        Self {
            prompt_units,
            completion_units,
            total_units: prompt_units + completion_units,
        }
    }
}

/// Uniform response returned by every adapter
///
/// Produced exactly once per successful call and owned by the caller after
/// return; nothing in the router mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text
    pub content: String,
    /// Backend model identifier that produced the response
    pub model: String,
    /// Unit accounting
    pub usage: Usage,
    /// Name of the provider that served the call
    pub provider: String,
    /// When the response was produced
    pub created: DateTime<Utc>,
    /// Opaque provider-specific metadata (finish reason, response id, ...)
    #[serde(default)]
    pub raw_metadata: HashMap<String, Value>,
}

/// Sampling parameters for a generation call
///
/// All fields are part of the cache key except `extra`, which is forwarded
/// to the backend verbatim and hashed by its serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Upper bound on completion units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_units: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Provider-specific passthrough parameters
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl GenerationOptions {
    /// Set the completion unit budget
    pub fn with_max_units(mut self, max_units: u32) -> Self {
        self.max_units = Some(max_units);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the nucleus sampling cutoff
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the stop sequences
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(100, 40);
        assert_eq!(usage.total_units, 140);
    }

    #[test]
    fn test_options_builder() {
        let opts = GenerationOptions::default()
            .with_max_units(256)
            .with_temperature(0.7);
        assert_eq!(opts.max_units, Some(256));
        assert_eq!(opts.temperature, Some(0.7));
        assert!(opts.top_p.is_none());
    }

    #[test]
    fn test_response_serde_round_trip() {
        let response = ModelResponse {
            content: "hello".to_string(),
            model: "gpt-4o-mini".to_string(),
            usage: Usage::new(10, 5),
            provider: "openai".to_string(),
            created: Utc::now(),
            raw_metadata: HashMap::new(),
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: ModelResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "hello");
        assert_eq!(back.usage.total_units, 15);
    }
}
