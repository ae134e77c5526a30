//! Research memory storage
//!
//! Facts, open and answered questions, issued search queries and visited
//! sources for one research session. Every collection is bounded by
//! `max_items` and evicts its oldest entry on overflow.
//!
//! Duplicate checks differ per collection and are kept that way:
//! - facts, questions, search queries: embedding similarity
//! - visited sources, answered-question moves: exact string match

use crate::embeddings::Deduplicator;
use crate::models::{MemoryItem, MemorySummary};
use crate::Result;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default number of facts returned by `get_relevant_facts`
pub const DEFAULT_RELEVANT_FACTS: usize = 5;

pub struct ResearchMemory {
    dedup: Deduplicator,
    max_items: usize,
    facts: VecDeque<MemoryItem>,
    questions: VecDeque<String>,
    answered_questions: VecDeque<String>,
    search_queries: VecDeque<String>,
    visited_sources: VecDeque<String>,
}

impl ResearchMemory {
    pub fn new(dedup: Deduplicator, max_items: usize) -> Self {
        Self {
            dedup,
            max_items,
            facts: VecDeque::new(),
            questions: VecDeque::new(),
            answered_questions: VecDeque::new(),
            search_queries: VecDeque::new(),
            visited_sources: VecDeque::new(),
        }
    }

    /// Add a fact unless it near-duplicates an existing one
    pub async fn add_fact(
        &mut self,
        content: &str,
        source: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<bool> {
        let existing: Vec<String> = self.facts.iter().map(|f| f.content.clone()).collect();
        if self.dedup.is_duplicate(content, &existing).await? {
            debug!(source = %source, "Rejected duplicate fact");
            return Ok(false);
        }

        debug!(source = %source, "MEMORY: {}", content);
        push_bounded(
            &mut self.facts,
            MemoryItem::new(content, source, metadata),
            self.max_items,
        );
        Ok(true)
    }

    /// Add an open question unless it near-duplicates an open or answered one
    pub async fn add_question(&mut self, question: &str) -> Result<bool> {
        let existing: Vec<String> = self
            .questions
            .iter()
            .chain(self.answered_questions.iter())
            .cloned()
            .collect();

        if self.dedup.is_duplicate(question, &existing).await? {
            debug!(question = %question, "Rejected duplicate question");
            return Ok(false);
        }

        push_bounded(&mut self.questions, question.to_string(), self.max_items);
        Ok(true)
    }

    /// Move an open question to the answered list.
    ///
    /// Exact string match only; a question that is not currently open is
    /// left alone.
    pub fn mark_question_answered(&mut self, question: &str) {
        let Some(position) = self.questions.iter().position(|q| q == question) else {
            return;
        };

        if let Some(answered) = self.questions.remove(position) {
            push_bounded(&mut self.answered_questions, answered, self.max_items);
        }
    }

    /// Record an issued search query unless a similar one was already issued
    pub async fn add_search_query(&mut self, query: &str) -> Result<bool> {
        let existing: Vec<String> = self.search_queries.iter().cloned().collect();
        if self.dedup.is_duplicate(query, &existing).await? {
            return Ok(false);
        }

        push_bounded(&mut self.search_queries, query.to_string(), self.max_items);
        Ok(true)
    }

    /// Record a visited source (exact match dedup)
    pub fn add_visited_source(&mut self, source: &str) -> bool {
        if self.visited_sources.iter().any(|s| s == source) {
            return false;
        }

        push_bounded(&mut self.visited_sources, source.to_string(), self.max_items);
        true
    }

    /// Facts ranked by similarity to `query`, best first, ties in insertion order
    pub async fn get_relevant_facts(
        &self,
        query: &str,
        max_facts: usize,
    ) -> Result<Vec<MemoryItem>> {
        if self.facts.is_empty() || max_facts == 0 {
            return Ok(Vec::new());
        }

        let contents: Vec<String> = self.facts.iter().map(|f| f.content.clone()).collect();
        let scores = self.dedup.similarities(query, &contents).await?;

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        // sort_by is stable, so equal scores keep insertion order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(ranked
            .into_iter()
            .take(max_facts)
            .filter_map(|(index, _)| self.facts.get(index).cloned())
            .collect())
    }

    /// Bulleted list of the most recent `max_facts` facts (all when `None`)
    pub fn get_formatted_facts(&self, max_facts: Option<usize>) -> String {
        let skip = max_facts
            .map(|max| self.facts.len().saturating_sub(max))
            .unwrap_or(0);

        format_fact_list(self.facts.iter().skip(skip))
    }

    pub fn facts(&self) -> impl Iterator<Item = &MemoryItem> {
        self.facts.iter()
    }

    /// Open questions in insertion order
    pub fn unanswered_questions(&self) -> impl Iterator<Item = &String> {
        self.questions.iter()
    }

    pub fn first_unanswered_question(&self) -> Option<&str> {
        self.questions.front().map(String::as_str)
    }

    pub fn answered_questions(&self) -> impl Iterator<Item = &String> {
        self.answered_questions.iter()
    }

    pub fn search_queries(&self) -> impl Iterator<Item = &String> {
        self.search_queries.iter()
    }

    pub fn visited_sources(&self) -> impl Iterator<Item = &String> {
        self.visited_sources.iter()
    }

    pub fn get_summary(&self) -> MemorySummary {
        MemorySummary {
            facts: self.facts.len(),
            questions: self.questions.len(),
            answered_questions: self.answered_questions.len(),
            search_queries: self.search_queries.len(),
            visited_sources: self.visited_sources.len(),
        }
    }
}

/// "- <fact>" per line
pub fn format_fact_list<'a>(facts: impl Iterator<Item = &'a MemoryItem>) -> String {
    facts
        .map(|fact| format!("- {}", fact))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_bounded<T>(items: &mut VecDeque<T>, item: T, max_items: usize) {
    items.push_back(item);
    while items.len() > max_items {
        items.pop_front();
    }
}
