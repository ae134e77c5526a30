//! Embedding similarity and deduplication
//!
//! The embedding model is an injected collaborator (`Arc<dyn Embedder>`).
//! Every similarity query embeds the query text and all candidates in a
//! single batch call.

use crate::error::ResearchError;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod openai;

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;
pub use openai::OpenAiEmbedder;

/// The embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Near-duplicate detection over sentence embeddings
#[derive(Clone)]
pub struct Deduplicator {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl Deduplicator {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    /// Similarity of `query` to each candidate, in candidate order
    pub async fn similarities(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = Vec::with_capacity(candidates.len() + 1);
        batch.push(query.to_string());
        batch.extend(candidates.iter().cloned());

        let embeddings = self.embedder.embed(&batch).await?;
        if embeddings.len() != batch.len() {
            return Err(ResearchError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }

        let (query_embedding, candidate_embeddings) = embeddings.split_at(1);
        Ok(candidate_embeddings
            .iter()
            .map(|candidate| cosine_similarity(&query_embedding[0], candidate))
            .collect())
    }

    /// Index and score of the closest candidate; first maximum wins ties
    pub async fn find_most_similar(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Option<(usize, f32)>> {
        let scores = self.similarities(query, candidates).await?;

        let mut best: Option<(usize, f32)> = None;
        for (index, score) in scores.into_iter().enumerate() {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        Ok(best)
    }

    /// Pairwise similarity of two texts
    pub async fn compute_similarity(&self, a: &str, b: &str) -> Result<f32> {
        let scores = self.similarities(a, &[b.to_string()]).await?;
        Ok(scores.first().copied().unwrap_or(0.0))
    }

    /// Duplicate check against the configured threshold
    pub async fn is_duplicate(&self, candidate: &str, existing: &[String]) -> Result<bool> {
        self.is_duplicate_with(candidate, existing, self.threshold).await
    }

    /// Duplicate check against an explicit threshold; no I/O when `existing` is empty
    pub async fn is_duplicate_with(
        &self,
        candidate: &str,
        existing: &[String],
        threshold: f32,
    ) -> Result<bool> {
        if existing.is_empty() {
            return Ok(false);
        }

        let duplicate = match self.find_most_similar(candidate, existing).await? {
            Some((index, score)) => {
                debug!(index, score, threshold, "Nearest neighbour");
                score >= threshold
            }
            None => false,
        };

        Ok(duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BagOfWordsEmbedder;

    fn dedup(threshold: f32) -> (Deduplicator, Arc<BagOfWordsEmbedder>) {
        let embedder = Arc::new(BagOfWordsEmbedder::new());
        (Deduplicator::new(embedder.clone(), threshold), embedder)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_similarity_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0], &[0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_empty_existing_skips_embedding() {
        let (dedup, embedder) = dedup(0.85);
        assert!(!dedup.is_duplicate("anything", &[]).await.unwrap());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_identical_text_is_duplicate_in_one_batch() {
        let (dedup, embedder) = dedup(0.85);
        let existing = vec![
            "apple earnings beat".to_string(),
            "nvidia guidance raised".to_string(),
        ];

        assert!(dedup.is_duplicate("nvidia guidance raised", &existing).await.unwrap());
        assert_eq!(embedder.calls(), 1);
        assert!(!dedup.is_duplicate("bank stocks slump", &existing).await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_threshold() {
        let (dedup, _) = dedup(0.99);
        let existing = vec!["nvidia guidance raised today".to_string()];

        // 3 shared words out of 3 and 4: similarity 3 / sqrt(12) ≈ 0.866
        assert!(!dedup.is_duplicate("nvidia guidance raised", &existing).await.unwrap());
        assert!(dedup
            .is_duplicate_with("nvidia guidance raised", &existing, 0.85)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_find_most_similar() {
        let (dedup, _) = dedup(0.85);
        let candidates = vec![
            "bank stocks".to_string(),
            "nvidia chips demand".to_string(),
            "nvidia chips".to_string(),
        ];

        let (index, score) = dedup
            .find_most_similar("nvidia chips", &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index, 2);
        assert!((score - 1.0).abs() < 1e-6);

        assert!(dedup.find_most_similar("x", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compute_similarity() {
        let (dedup, _) = dedup(0.85);
        let score = dedup.compute_similarity("rate cut", "rate cut").await.unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }
}
