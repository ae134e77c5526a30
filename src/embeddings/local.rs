//! Local sentence embeddings via fastembed

use crate::embeddings::Embedder;
use crate::error::ResearchError;
use crate::Result;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
    model_name: String,
}

impl FastEmbedder {
    /// Load the model named by `EMBEDDING_MODEL` (downloads on first use)
    pub fn new(model_name: &str) -> Result<Self> {
        let model = parse_model_name(model_name)?;

        info!(model = %model_name, "Initializing embedding model");

        let text_embedding =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(true))
                .map_err(|e| ResearchError::EmbeddingError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(text_embedding),
            model_name: model_name.to_string(),
        })
    }
}

fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
    let model = match name {
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLML12V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
        other => {
            return Err(ResearchError::ConfigError(format!(
                "Unknown local embedding model '{}'",
                other
            )))
        }
    };
    Ok(model)
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let batch = texts.to_vec();

        // fastembed is synchronous
        let embeddings = task::spawn_blocking(move || model.embed(batch, None))
            .await
            .map_err(|e| ResearchError::EmbeddingError(format!("Embedding task failed: {}", e)))?
            .map_err(|e| ResearchError::EmbeddingError(e.to_string()))?;

        debug!(batch_size = embeddings.len(), "Generated local embeddings");

        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_name() {
        assert!(parse_model_name("all-MiniLM-L6-v2").is_ok());
        assert!(parse_model_name("unknown-model").is_err());
    }
}
