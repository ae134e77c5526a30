//! Research configuration
//!
//! Built-in defaults, overridable per key through environment variables.
//! Binaries call `dotenv::dotenv()` before `ResearchConfig::from_env()`.

use crate::error::ResearchError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/v1";
pub const DEFAULT_MODEL_NAME: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// OpenAI-compatible base URL (including the `/v1` suffix)
    pub model_endpoint: String,
    pub model_name: String,
    /// Bearer token for the endpoint; vLLM accepts requests without one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Max output tokens per completion
    pub max_tokens: u32,
    /// Session-wide token budget; the loop stops once it is reached
    pub token_budget: usize,
    pub max_search_results: usize,
    pub max_steps: usize,
    pub max_memory_items: usize,
    pub embedding_model: String,
    /// Embeddings endpoint; falls back to `model_endpoint`
    pub embedding_endpoint: Option<String>,
    pub similarity_threshold: f32,
    /// Pause between research steps, 0 disables it
    pub step_delay_ms: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model_endpoint: DEFAULT_ENDPOINT.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            api_key: None,
            max_tokens: 8192,
            token_budget: 4096,
            max_search_results: 5,
            max_steps: 10,
            max_memory_items: 100,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_endpoint: None,
            similarity_threshold: 0.85,
            step_delay_ms: 100,
        }
    }
}

impl ResearchConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(endpoint) = env::var("VLLM_ENDPOINT") {
            self.model_endpoint = endpoint;
        }
        if let Ok(model) = env::var("VLLM_MODEL_NAME") {
            self.model_name = model;
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Ok(endpoint) = env::var("EMBEDDING_ENDPOINT") {
            self.embedding_endpoint = Some(endpoint);
        }

        if let Some(v) = parse_env("MAX_TOKENS")? {
            self.max_tokens = v;
        }
        if let Some(v) = parse_env("TOKEN_BUDGET")? {
            self.token_budget = v;
        }
        if let Some(v) = parse_env("MAX_SEARCH_RESULTS")? {
            self.max_search_results = v;
        }
        if let Some(v) = parse_env("MAX_STEPS")? {
            self.max_steps = v;
        }
        if let Some(v) = parse_env("MAX_MEMORY_ITEMS")? {
            self.max_memory_items = v;
        }
        if let Some(v) = parse_env("SIMILARITY_THRESHOLD")? {
            self.similarity_threshold = v;
        }
        if let Some(v) = parse_env("STEP_DELAY_MS")? {
            self.step_delay_ms = v;
        }

        self.validate()
    }

    /// Override the step limit (CLI `--max-steps`)
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn embedding_endpoint(&self) -> &str {
        self.embedding_endpoint
            .as_deref()
            .unwrap_or(&self.model_endpoint)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ResearchError::ConfigError(format!(
                "SIMILARITY_THRESHOLD must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_memory_items == 0 {
            return Err(ResearchError::ConfigError(
                "MAX_MEMORY_ITEMS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ResearchError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.token_budget, 4096);
        assert_eq!(config.max_memory_items, 100);
        assert!((config.similarity_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.embedding_endpoint(), DEFAULT_ENDPOINT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_max_steps() {
        let config = ResearchConfig::default().with_max_steps(3);
        assert_eq!(config.max_steps, 3);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = ResearchConfig {
            similarity_threshold: 1.5,
            ..ResearchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_reports_bad_values() {
        // Unique key so parallel tests never race on it
        env::set_var("SDR_TEST_BAD_NUMBER", "not-a-number");
        let parsed: Result<Option<usize>> = parse_env("SDR_TEST_BAD_NUMBER");
        assert!(parsed.is_err());
        env::remove_var("SDR_TEST_BAD_NUMBER");

        let missing: Result<Option<usize>> = parse_env("SDR_TEST_MISSING_KEY");
        assert!(matches!(missing, Ok(None)));
    }
}
