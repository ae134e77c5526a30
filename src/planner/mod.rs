//! Research planner
//!
//! Chooses the next action from the current memory summary. The policy is
//! deterministic and re-evaluated from scratch every step.

use crate::models::{MemorySummary, ResearchAction};
use tracing::info;

/// Facts needed before the planner prefers reasoning or answering
const SUFFICIENT_FACTS: usize = 3;

/// Every `SEARCH_INTERVAL`-th step searches an open question instead of
/// reasoning about it
const SEARCH_INTERVAL: usize = 3;

/// Everything the planner looks at for one decision
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub research_query: String,
    pub summary: MemorySummary,
    /// First open question in insertion order
    pub next_question: Option<String>,
    pub current_step: usize,
    pub max_steps: usize,
}

/// Trait for next-action selection
pub trait ResearchPlanner: Send + Sync {
    fn plan(&self, context: &PlanningContext) -> ResearchAction;
}

/// Rule-based planner:
/// 1. no facts: search the original query
/// 2. open questions: search the first one on every third step or while
///    facts are scarce, otherwise reason about it
/// 3. enough facts or past half the step budget: answer
/// 4. otherwise search the original query again
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicPlanner;

impl ResearchPlanner for HeuristicPlanner {
    fn plan(&self, context: &PlanningContext) -> ResearchAction {
        let step = context.current_step;
        let facts = context.summary.facts;

        if facts == 0 {
            info!(
                step,
                "PLAN: No facts yet, starting with search for '{}'",
                context.research_query
            );
            return ResearchAction::Search {
                query: context.research_query.clone(),
            };
        }

        if context.summary.questions > 0 {
            if let Some(question) = &context.next_question {
                if step % SEARCH_INTERVAL == 0 || facts < SUFFICIENT_FACTS {
                    info!(
                        step,
                        "PLAN: Searching for more information about '{}'",
                        question
                    );
                    return ResearchAction::Search {
                        query: question.clone(),
                    };
                }

                info!(step, "PLAN: Reasoning about current knowledge");
                return ResearchAction::Reason {
                    focus_question: question.clone(),
                };
            }
        }

        if facts >= SUFFICIENT_FACTS || step >= context.max_steps / 2 {
            info!(step, "PLAN: Have sufficient information, generating answer");
            return ResearchAction::Answer;
        }

        info!(step, "PLAN: Continuing research with more search");
        ResearchAction::Search {
            query: context.research_query.clone(),
        }
    }
}
