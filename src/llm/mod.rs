//! Model interface
//!
//! Wraps an OpenAI-compatible language model with two contracts:
//! free-text generation and schema-constrained structured generation.
//! Every call reports the tokens it spent; callers keep their own totals.

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod openai;
pub mod schema;

pub use openai::OpenAiClient;
pub use schema::{FieldType, SchemaField, StructuredResponse};

/// Sampling temperature used when a call does not override it
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Server-reported usage, when the endpoint returns it
    pub usage: Option<TokenUsage>,
}

/// The language-model collaborator
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
    fn model_name(&self) -> &str;
}

/// Outcome of a structured call
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput<T> {
    Parsed(T),
    /// The reply did not match the schema; raw text is kept for fallbacks
    Degraded { text: String, error: String },
}

/// A model result together with the tokens the call spent
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub tokens: usize,
}

impl<T> Metered<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metered<U> {
        Metered {
            value: f(self.value),
            tokens: self.tokens,
        }
    }
}

/// Approximate token count (~4 chars per token)
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

pub struct ModelInterface {
    model: Arc<dyn LanguageModel>,
    default_temperature: f32,
}

impl ModelInterface {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            default_temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Free-text generation
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<Metered<String>> {
        let request = CompletionRequest {
            system_prompt: system_prompt.map(str::to_string),
            prompt: prompt.to_string(),
            temperature: Some(temperature.unwrap_or(self.default_temperature)),
        };

        self.complete_metered(request).await
    }

    /// Structured generation into the fixed result shape `T`.
    ///
    /// Transport failures propagate; a reply that does not fit the schema
    /// degrades to `StructuredOutput::Degraded` instead of erroring.
    pub async fn generate_structured<T: StructuredResponse>(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<Metered<StructuredOutput<T>>> {
        let instructions = schema::format_instructions(T::schema());
        let system = match system_prompt {
            Some(base) => format!("{}\n{}", base, instructions),
            None => instructions,
        };

        let request = CompletionRequest {
            system_prompt: Some(system),
            prompt: prompt.to_string(),
            temperature: Some(temperature.unwrap_or(self.default_temperature)),
        };

        let raw = self.complete_metered(request).await?;

        Ok(raw.map(|text| match schema::parse_structured::<T>(&text) {
            Ok(parsed) => StructuredOutput::Parsed(parsed),
            Err(error) => {
                warn!(error = %error, "Structured output did not match schema");
                StructuredOutput::Degraded { text, error }
            }
        }))
    }

    async fn complete_metered(&self, request: CompletionRequest) -> Result<Metered<String>> {
        let prompt_estimate = estimate_tokens(&request.prompt)
            + request
                .system_prompt
                .as_deref()
                .map(estimate_tokens)
                .unwrap_or(0);

        let completion = self.model.complete(request).await?;

        let spent = match completion.usage {
            Some(usage) => usage.prompt_tokens + usage.completion_tokens,
            None => prompt_estimate + estimate_tokens(&completion.text),
        };

        debug!(tokens = spent, "Model call metered");

        Ok(Metered {
            value: completion.text,
            tokens: spent,
        })
    }
}
