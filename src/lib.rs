//! Stock Deep Research
//!
//! An iterative research agent for stock-market questions:
//! - Expands the question into targeted news searches
//! - Keeps a deduplicated, bounded memory of facts and open questions
//! - Reasons over relevant facts to raise follow-up questions
//! - Synthesizes a final answer once enough is known or the budget runs out
//!
//! LOOP:
//! PLAN → SEARCH | READ | REASON | ANSWER → ... → FINALIZE

pub mod agent;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod planner;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use agent::DeepResearcher;
pub use config::ResearchConfig;
pub use error::ResearchError;
pub use models::*;
