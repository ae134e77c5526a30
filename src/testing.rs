//! In-process collaborators for unit tests

use crate::embeddings::Embedder;
use crate::llm::{Completion, CompletionRequest, LanguageModel};
use crate::models::Article;
use crate::tools::NewsSearch;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const DIMENSIONS: usize = 512;

/// Binary bag-of-words vectors over a vocabulary built on the fly.
///
/// Texts with the same lowercase word set embed identically, and partial
/// overlap gives `shared / sqrt(|a| * |b|)`.
pub struct BagOfWordsEmbedder {
    vocabulary: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            vocabulary: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vocabulary = self.vocabulary.lock().unwrap();
        let mut vector = vec![0.0; DIMENSIONS];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let next = vocabulary.len();
            let index = *vocabulary.entry(word.to_lowercase()).or_insert(next);
            vector[index % DIMENSIONS] = 1.0;
        }

        vector
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }
}

/// Replies with scripted texts in order, repeating the last one
pub struct ScriptedModel {
    replies: Vec<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len().min(self.replies.len().saturating_sub(1));
        requests.push(request);

        Ok(Completion {
            text: self.replies.get(index).cloned().unwrap_or_default(),
            usage: None,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Returns the same articles for every query
pub struct FixedNewsSearch {
    provider: String,
    articles: Vec<Article>,
    queries: Mutex<Vec<String>>,
}

impl FixedNewsSearch {
    pub fn new(provider: &str, articles: Vec<Article>) -> Self {
        Self {
            provider: provider.to_string(),
            articles,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsSearch for FixedNewsSearch {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn search(&self, query: &str) -> Result<Vec<Article>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.articles.clone())
    }
}

/// An article attributed to `source`
pub fn article(title: &str, content: &str, source: &str) -> Article {
    Article {
        title: title.to_string(),
        content: content.to_string(),
        source: source.to_string(),
    }
}
