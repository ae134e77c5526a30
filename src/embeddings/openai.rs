//! Embeddings over an OpenAI-compatible `/embeddings` endpoint

use crate::embeddings::Embedder;
use crate::error::ResearchError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Embedding request failed: {}", e);
            ResearchError::EmbeddingError(format!("Request to {} failed: {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResearchError::EmbeddingError(format!(
                "Endpoint returned {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::EmbeddingError(format!("Invalid response: {}", e)))?;

        let embeddings = order_embeddings(parsed, texts.len())?;

        debug!(
            batch_size = embeddings.len(),
            dimension = embeddings.first().map(|e| e.len()).unwrap_or(0),
            "Generated batch embeddings"
        );

        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Restore input order; servers may return `data` unsorted
fn order_embeddings(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(ResearchError::EmbeddingError(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
