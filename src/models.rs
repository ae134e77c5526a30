//! Core data models for the research loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Memory =================
//

/// A single fact held in research memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryItem {
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            metadata: metadata.unwrap_or_default(),
        }
    }
}

impl fmt::Display for MemoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Source: {})", self.content, self.source)
    }
}

/// Counts over every memory collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub facts: usize,
    pub questions: usize,
    pub answered_questions: usize,
    pub search_queries: usize,
    pub visited_sources: usize,
}

//
// ================= Search =================
//

/// A news article returned by a search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub content: String,
    /// Publisher, or the search provider when the publisher is unknown
    pub source: String,
}

impl Article {
    /// Fact source label: "<provider> - <title>"
    pub fn fact_source(&self, provider: &str) -> String {
        format!("{} - {}", provider, self.title)
    }

    /// Fact content: "<title>: <content>"
    pub fn fact_content(&self) -> String {
        format!("{}: {}", self.title, self.content)
    }
}

//
// ================= Actions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Search,
    Read,
    Reason,
    Answer,
}

/// A planned research step with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchAction {
    Search { query: String },
    Read,
    Reason { focus_question: String },
    Answer,
}

impl ResearchAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            ResearchAction::Search { .. } => ActionType::Search,
            ResearchAction::Read => ActionType::Read,
            ResearchAction::Reason { .. } => ActionType::Reason,
            ResearchAction::Answer => ActionType::Answer,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Search => "SEARCH",
            ActionType::Read => "READ",
            ActionType::Reason => "REASON",
            ActionType::Answer => "ANSWER",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Final Result =================
//

/// Everything a finished research session reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub session_id: Uuid,
    pub query: String,
    pub answer: String,
    pub steps_taken: usize,
    /// True when the planner chose ANSWER, false when finalization produced it
    pub answered_by_plan: bool,
    pub tokens_used: usize,
    pub memory: MemorySummary,
    pub started_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Prefix a query with the ticker it should focus on
pub fn ticker_query(query: &str, ticker: Option<&str>) -> String {
    match ticker.map(str::trim).filter(|t| !t.is_empty()) {
        Some(ticker) => format!("Regarding {} stock: {}", ticker, query),
        None => query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_item_display() {
        let item = MemoryItem::new("NVDA beat estimates", "Reasoning", None);
        assert_eq!(item.to_string(), "NVDA beat estimates (Source: Reasoning)");
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn test_article_fact_fields() {
        let article = Article {
            title: "Chip rally".to_string(),
            content: "Semis gained 3%".to_string(),
            source: "Reuters".to_string(),
        };
        assert_eq!(
            article.fact_source("Yahoo Finance News"),
            "Yahoo Finance News - Chip rally"
        );
        assert_eq!(article.fact_content(), "Chip rally: Semis gained 3%");
    }

    #[test]
    fn test_action_type_display() {
        let action = ResearchAction::Reason {
            focus_question: "Why?".to_string(),
        };
        assert_eq!(action.action_type(), ActionType::Reason);
        assert_eq!(action.action_type().to_string(), "REASON");
    }

    #[test]
    fn test_ticker_query() {
        assert_eq!(
            ticker_query("What is the outlook?", Some("NVDA")),
            "Regarding NVDA stock: What is the outlook?"
        );
        assert_eq!(ticker_query("q", None), "q");
        assert_eq!(ticker_query("q", Some("  ")), "q");
    }
}
