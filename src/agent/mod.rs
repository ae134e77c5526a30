//! Deep research orchestrator
//!
//! PLAN → SEARCH | READ | REASON | ANSWER → repeat, until an answer is
//! produced or the step or token budget runs out. A session that ends
//! without answering is finalized from whatever facts were collected.

use crate::config::ResearchConfig;
use crate::embeddings::{Deduplicator, Embedder};
use crate::error::ResearchError;
use crate::llm::{
    FieldType, ModelInterface, OpenAiClient, SchemaField, StructuredOutput, StructuredResponse,
};
use crate::memory::{format_fact_list, ResearchMemory, DEFAULT_RELEVANT_FACTS};
use crate::models::{ResearchAction, ResearchOutcome};
use crate::planner::{HeuristicPlanner, PlanningContext, ResearchPlanner};
use crate::tools::{NewsSearch, QueryExpansionTool, YahooFinanceNews};
use crate::Result;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Source label for facts produced by a REASON step
pub const REASONING_SOURCE: &str = "Reasoning";

const REASON_SYSTEM_PROMPT: &str = r#"You are a financial researcher analyzing information about stocks and markets.
Your task is to analyze the provided facts, extract insights, and identify gaps in information.
Follow these guidelines:
1. Analyze the facts to extract key insights relevant to the focus question.
2. Identify important connections or patterns in the data.
3. List follow-up questions that would help fill gaps in knowledge.
4. Keep your analysis focused on the specific focus question."#;

const ANSWER_SYSTEM_PROMPT: &str = r#"You are a financial research analyst providing insights based on information gathered.
Your task is to synthesize the provided facts into a comprehensive, well-structured answer.
Follow these guidelines:
1. Focus on directly answering the original research question.
2. Organize your response logically with clear sections if needed.
3. Be specific and cite information sources where relevant.
4. Acknowledge limitations or uncertainties in the available information.
5. Provide actionable conclusions or recommendations if appropriate."#;

/// Result shape of a REASON step
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReasoningOutput {
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default, alias = "followUpQuestions")]
    pub follow_up_questions: Vec<String>,
}

impl StructuredResponse for ReasoningOutput {
    fn schema() -> &'static [SchemaField] {
        const FIELDS: &[SchemaField] = &[
            SchemaField::new(
                "insights",
                FieldType::StringArray,
                "Key insights extracted from the facts",
            ),
            SchemaField::new(
                "follow_up_questions",
                FieldType::StringArray,
                "Follow-up questions to fill knowledge gaps",
            ),
        ];
        FIELDS
    }
}

/// Per-invocation loop state
#[derive(Debug, Default)]
struct Session {
    query: String,
    current_step: usize,
    /// Prompt plus completion tokens spent by this session's model calls
    tokens_used: usize,
    complete: bool,
    answer: String,
}

/// Runs the iterative search-read-reason loop
pub struct DeepResearcher {
    config: ResearchConfig,
    model: Arc<ModelInterface>,
    news: Arc<dyn NewsSearch>,
    dedup: Deduplicator,
    expansion: QueryExpansionTool,
    planner: Box<dyn ResearchPlanner>,
    memory: ResearchMemory,
    session: Session,
}

impl DeepResearcher {
    pub fn new(
        config: ResearchConfig,
        model: Arc<ModelInterface>,
        news: Arc<dyn NewsSearch>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let dedup = Deduplicator::new(embedder, config.similarity_threshold);
        let memory = ResearchMemory::new(dedup.clone(), config.max_memory_items);

        Self {
            expansion: QueryExpansionTool::new(Arc::clone(&model)),
            planner: Box::new(HeuristicPlanner),
            config,
            model,
            news,
            dedup,
            memory,
            session: Session::default(),
        }
    }

    /// Wire the HTTP model client, Yahoo Finance news and the configured
    /// embedder
    pub fn from_config(config: ResearchConfig) -> Result<Self> {
        config.validate()?;

        let client = OpenAiClient::new(
            &config.model_endpoint,
            config.model_name.clone(),
            config.api_key.clone(),
            config.max_tokens,
        )?;
        let model = Arc::new(ModelInterface::new(Arc::new(client)));
        let news = Arc::new(YahooFinanceNews::new(config.max_search_results)?);
        let embedder = build_embedder(&config)?;

        info!(
            model = %model.model_name(),
            embedding_model = %embedder.model_name(),
            max_steps = config.max_steps,
            "Deep researcher initialized"
        );

        Ok(Self::new(config, model, news, embedder))
    }

    /// Replace the default heuristic planner
    pub fn with_planner(mut self, planner: Box<dyn ResearchPlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Memory of the most recent session
    pub fn memory(&self) -> &ResearchMemory {
        &self.memory
    }

    /// Research `query` and return the synthesized answer
    pub async fn research(&mut self, query: &str) -> Result<String> {
        Ok(self.research_with_report(query).await?.answer)
    }

    /// Research `query` and return the answer with session statistics
    pub async fn research_with_report(&mut self, query: &str) -> Result<ResearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::InvalidInput(
                "Research query must not be empty".to_string(),
            ));
        }

        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();

        // Fresh state for every invocation
        self.session = Session {
            query: query.to_string(),
            ..Default::default()
        };
        self.memory = ResearchMemory::new(self.dedup.clone(), self.config.max_memory_items);
        self.memory.add_question(query).await?;

        info!(session_id = %session_id, "Starting deep research for query: {}", query);

        while !self.session.complete && self.session.current_step < self.config.max_steps {
            self.session.current_step += 1;

            let tokens_used = self.session.tokens_used;
            if tokens_used >= self.config.token_budget {
                warn!(
                    tokens_used,
                    budget = self.config.token_budget,
                    "Token budget exceeded after {} steps",
                    self.session.current_step
                );
                break;
            }

            let action = self.planner.plan(&self.planning_context());
            debug!(
                step = self.session.current_step,
                action = %action.action_type(),
                "Planned action"
            );

            self.execute(action).await?;

            let summary = self.memory.get_summary();
            debug!(
                step = self.session.current_step,
                facts = summary.facts,
                questions = summary.questions,
                answered = summary.answered_questions,
                "Memory state"
            );

            if !self.session.complete && self.config.step_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
            }
        }

        let answered_by_plan = self.session.complete;
        if !answered_by_plan {
            info!(
                "Research incomplete after {} steps. Generating final answer with current knowledge.",
                self.session.current_step
            );
            self.generate_final_answer().await?;
        }

        info!(
            session_id = %session_id,
            tokens_used = self.session.tokens_used,
            "Deep research completed in {} steps",
            self.session.current_step
        );

        Ok(ResearchOutcome {
            session_id,
            query: self.session.query.clone(),
            answer: self.session.answer.clone(),
            steps_taken: self.session.current_step,
            answered_by_plan,
            tokens_used: self.session.tokens_used,
            memory: self.memory.get_summary(),
            started_at,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    fn planning_context(&self) -> PlanningContext {
        PlanningContext {
            research_query: self.session.query.clone(),
            summary: self.memory.get_summary(),
            next_question: self
                .memory
                .first_unanswered_question()
                .map(str::to_string),
            current_step: self.session.current_step,
            max_steps: self.config.max_steps,
        }
    }

    async fn execute(&mut self, action: ResearchAction) -> Result<()> {
        match action {
            ResearchAction::Search { query } => self.execute_search(&query).await,
            ResearchAction::Read => {
                info!(
                    step = self.session.current_step,
                    "READ: Reading information (handled with search)"
                );
                Ok(())
            }
            ResearchAction::Reason { focus_question } => {
                self.execute_reason(&focus_question).await
            }
            ResearchAction::Answer => {
                info!(
                    step = self.session.current_step,
                    "ANSWER: Generating final answer"
                );
                self.generate_final_answer().await?;
                self.session.complete = true;
                Ok(())
            }
        }
    }

    async fn execute_search(&mut self, query: &str) -> Result<()> {
        let step = self.session.current_step;
        info!(step, "SEARCH: Searching for: {}", query);

        let expanded = self.expansion.expand_query(query, None).await?;
        self.session.tokens_used += expanded.tokens;
        let expanded = expanded.value;
        info!(step, "SEARCH: Expanded to {} queries", expanded.len());

        self.memory.add_search_query(query).await?;

        let mut articles = Vec::new();
        for expanded_query in &expanded {
            let found = self.news.search(expanded_query).await?;
            debug!(
                step,
                query = %expanded_query,
                count = found.len(),
                "SEARCH: Found articles"
            );
            articles.extend(found);
        }

        let provider = self.news.provider().to_string();
        let mut added = 0;
        for article in &articles {
            if self
                .memory
                .add_fact(&article.fact_content(), &article.fact_source(&provider), None)
                .await?
            {
                added += 1;
            }
        }

        info!(
            step,
            "SEARCH: Added {} of {} articles to memory",
            added,
            articles.len()
        );
        Ok(())
    }

    async fn execute_reason(&mut self, focus_question: &str) -> Result<()> {
        let step = self.session.current_step;
        info!(step, "REASON: Reasoning about: {}", focus_question);

        let relevant = self
            .memory
            .get_relevant_facts(focus_question, DEFAULT_RELEVANT_FACTS)
            .await?;

        let prompt = format!(
            "Focus Question: {}\n\nFacts:\n{}\n\nAnalyze these facts to provide insights about the focus question. Then identify 2-3 specific follow-up questions that would help fill gaps in knowledge.",
            focus_question,
            format_fact_list(relevant.iter())
        );

        let output = self
            .model
            .generate_structured::<ReasoningOutput>(&prompt, Some(REASON_SYSTEM_PROMPT), None)
            .await?;
        self.session.tokens_used += output.tokens;

        let reasoning = match output.value {
            StructuredOutput::Parsed(reasoning) => reasoning,
            StructuredOutput::Degraded { error, .. } => {
                warn!(
                    step,
                    error = %error,
                    "REASON: Unstructured reply, no insights recorded"
                );
                ReasoningOutput::default()
            }
        };

        for insight in &reasoning.insights {
            if self.memory.add_fact(insight, REASONING_SOURCE, None).await? {
                info!(step, "REASON: Insight: {}", insight);
            }
        }

        for question in &reasoning.follow_up_questions {
            if self.memory.add_question(question).await? {
                info!(step, "REASON: New question: {}", question);
            }
        }

        self.memory.mark_question_answered(focus_question);
        Ok(())
    }

    async fn generate_final_answer(&mut self) -> Result<()> {
        let prompt = format!(
            "Research Question: {}\n\nFacts collected during research:\n{}\n\nBased on these facts, provide a comprehensive answer to the research question.",
            self.session.query,
            self.memory.get_formatted_facts(None)
        );

        let answer = self
            .model
            .generate(&prompt, Some(ANSWER_SYSTEM_PROMPT), None)
            .await?;
        self.session.tokens_used += answer.tokens;
        self.session.answer = answer.value;

        info!(
            step = self.session.current_step,
            "ANSWER: Final answer generated"
        );
        Ok(())
    }
}

#[cfg(feature = "local-embeddings")]
fn build_embedder(config: &ResearchConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(crate::embeddings::FastEmbedder::new(
        &config.embedding_model,
    )?))
}

#[cfg(not(feature = "local-embeddings"))]
fn build_embedder(config: &ResearchConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(crate::embeddings::OpenAiEmbedder::new(
        config.embedding_endpoint(),
        config.embedding_model.clone(),
        config.api_key.clone(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use crate::testing::{article, BagOfWordsEmbedder, FixedNewsSearch, ScriptedModel};

    const PROVIDER: &str = "Yahoo Finance News";
    const PUBLISHER: &str = "Reuters";

    fn config(max_steps: usize) -> ResearchConfig {
        ResearchConfig {
            step_delay_ms: 0,
            ..ResearchConfig::default()
        }
        .with_max_steps(max_steps)
    }

    fn nvidia_articles() -> Vec<Article> {
        vec![
            article(
                "Nvidia beats estimates",
                "Data center revenue doubled",
                PUBLISHER,
            ),
            article(
                "Chip export rules tighten",
                "Washington limits shipments abroad",
                PUBLISHER,
            ),
        ]
    }

    fn researcher_on(config: ResearchConfig, model: Arc<ModelInterface>) -> DeepResearcher {
        DeepResearcher::new(
            config,
            model,
            Arc::new(FixedNewsSearch::new(PROVIDER, nvidia_articles())),
            Arc::new(BagOfWordsEmbedder::new()),
        )
    }

    fn researcher(
        config: ResearchConfig,
        replies: Vec<&str>,
        articles: Vec<Article>,
    ) -> (DeepResearcher, Arc<ScriptedModel>, Arc<FixedNewsSearch>) {
        let model = Arc::new(ScriptedModel::new(
            replies.into_iter().map(str::to_string).collect(),
        ));
        let news = Arc::new(FixedNewsSearch::new(PROVIDER, articles));
        let researcher = DeepResearcher::new(
            config,
            Arc::new(ModelInterface::new(model.clone())),
            news.clone(),
            Arc::new(BagOfWordsEmbedder::new()),
        );
        (researcher, model, news)
    }

    struct FixedPlanner(ResearchAction);

    impl ResearchPlanner for FixedPlanner {
        fn plan(&self, _context: &PlanningContext) -> ResearchAction {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_single_search_then_finalization() {
        let (mut researcher, _, news) =
            researcher(config(1), vec!["Stub synthesis"], nvidia_articles());

        let outcome = researcher.research_with_report("NVIDIA outlook").await.unwrap();

        assert_eq!(outcome.answer, "Stub synthesis");
        assert_eq!(outcome.steps_taken, 1);
        assert!(!outcome.answered_by_plan);
        // Unstructured expansion reply falls back to line splitting
        assert_eq!(news.queries(), vec!["Stub synthesis"]);

        let sources: Vec<&str> = researcher
            .memory()
            .facts()
            .map(|f| f.source.as_str())
            .collect();
        assert_eq!(
            sources,
            vec![
                "Yahoo Finance News - Nvidia beats estimates",
                "Yahoo Finance News - Chip export rules tighten"
            ]
        );
        let first = researcher.memory().facts().next().unwrap();
        assert_eq!(
            first.content,
            "Nvidia beats estimates: Data center revenue doubled"
        );
        assert_eq!(outcome.memory.facts, 2);
        assert_eq!(outcome.memory.search_queries, 1);
    }

    #[tokio::test]
    async fn test_forced_finalization_with_search_planner() {
        let (researcher, _, _) =
            researcher(config(1), vec!["Best effort answer"], nvidia_articles());
        let mut researcher =
            researcher.with_planner(Box::new(FixedPlanner(ResearchAction::Search {
                query: "NVIDIA outlook".to_string(),
            })));

        let answer = researcher.research("NVIDIA outlook").await.unwrap();
        assert!(!answer.is_empty());
        assert_eq!(answer, "Best effort answer");
    }

    #[tokio::test]
    async fn test_answer_action_completes_session() {
        let (researcher, model, _) =
            researcher(config(5), vec!["Planned answer"], nvidia_articles());
        let mut researcher =
            researcher.with_planner(Box::new(FixedPlanner(ResearchAction::Answer)));

        let outcome = researcher.research_with_report("NVIDIA outlook").await.unwrap();

        assert!(outcome.answered_by_plan);
        assert_eq!(outcome.steps_taken, 1);
        assert_eq!(outcome.answer, "Planned answer");
        // One synthesis call and no finalization call
        assert_eq!(model.requests().len(), 1);
        let request = &model.requests()[0];
        assert!(request.prompt.starts_with("Research Question: NVIDIA outlook"));
        assert_eq!(request.system_prompt.as_deref(), Some(ANSWER_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_reason_step_records_insights_and_questions() {
        let articles = vec![
            article("Nvidia beats estimates", "Data center revenue doubled", PROVIDER),
            article("Chip export rules tighten", "Washington limits shipments abroad", PROVIDER),
            article("Gaming segment flat", "Consoles cooled off", PROVIDER),
        ];
        let replies = vec![
            r#"{"queries": ["nvda"]}"#,
            r#"{"insights": ["Accelerator orders outpace supply"], "followUpQuestions": ["How are competitors responding?"]}"#,
            "Final answer",
        ];
        let (mut researcher, model, _) = researcher(config(2), replies, articles);

        // Step 1 searches, step 2 reasons about the seeded question
        let outcome = researcher.research_with_report("NVIDIA outlook").await.unwrap();
        assert_eq!(outcome.answer, "Final answer");
        assert_eq!(outcome.memory.facts, 4);

        let memory = researcher.memory();
        let insight = memory.facts().last().unwrap();
        assert_eq!(insight.content, "Accelerator orders outpace supply");
        assert_eq!(insight.source, REASONING_SOURCE);

        let open: Vec<&String> = memory.unanswered_questions().collect();
        assert_eq!(open, vec!["How are competitors responding?"]);
        let answered: Vec<&String> = memory.answered_questions().collect();
        assert_eq!(answered, vec!["NVIDIA outlook"]);

        let requests = model.requests();
        assert!(requests[1].prompt.starts_with("Focus Question: NVIDIA outlook"));
        assert!(requests[2]
            .prompt
            .contains("- Accelerator orders outpace supply (Source: Reasoning)"));
    }

    #[tokio::test]
    async fn test_unstructured_reasoning_still_marks_question() {
        let mut researcher = researcher(config(5), vec!["not json"], nvidia_articles()).0;
        researcher.session.query = "NVIDIA outlook".to_string();
        researcher.memory.add_question("NVIDIA outlook").await.unwrap();

        researcher.execute_reason("NVIDIA outlook").await.unwrap();

        assert_eq!(researcher.memory().get_summary().questions, 0);
        assert_eq!(researcher.memory().get_summary().answered_questions, 1);
        assert_eq!(researcher.memory().get_summary().facts, 0);
    }

    #[tokio::test]
    async fn test_token_budget_stops_loop() {
        let mut config = config(10);
        config.token_budget = 1;
        let (mut researcher, _, _) = researcher(config, vec!["Budget answer"], nvidia_articles());

        let outcome = researcher.research_with_report("NVIDIA outlook").await.unwrap();

        // Step 1 runs, step 2 sees the spent budget and stops
        assert_eq!(outcome.steps_taken, 2);
        assert!(!outcome.answered_by_plan);
        assert_eq!(outcome.answer, "Budget answer");
        assert!(outcome.tokens_used >= 1);
    }

    #[tokio::test]
    async fn test_token_totals_are_per_session_on_shared_model() {
        let mut config = config(3);
        config.step_delay_ms = 1;

        let solo_model = Arc::new(ModelInterface::new(Arc::new(ScriptedModel::new(vec![
            "x".to_string(),
        ]))));
        let mut alone = researcher_on(config.clone(), solo_model);
        let solo = alone.research_with_report("NVIDIA outlook").await.unwrap();
        assert!(solo.tokens_used > 0);

        let shared = Arc::new(ModelInterface::new(Arc::new(ScriptedModel::new(vec![
            "x".to_string(),
        ]))));
        let mut first = researcher_on(config.clone(), Arc::clone(&shared));
        let mut second = researcher_on(config, shared);

        let (a, b) = tokio::join!(
            first.research_with_report("NVIDIA outlook"),
            second.research_with_report("NVIDIA outlook")
        );

        assert_eq!(a.unwrap().tokens_used, solo.tokens_used);
        assert_eq!(b.unwrap().tokens_used, solo.tokens_used);
    }

    #[tokio::test]
    async fn test_read_is_a_no_op() {
        let (mut researcher, model, news) = researcher(config(5), vec!["x"], nvidia_articles());

        researcher.execute(ResearchAction::Read).await.unwrap();

        assert!(model.requests().is_empty());
        assert!(news.queries().is_empty());
        assert_eq!(researcher.memory().get_summary(), Default::default());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (mut researcher, _, _) = researcher(config(1), vec!["answer"], nvidia_articles());

        researcher.research("NVIDIA outlook").await.unwrap();
        let outcome = researcher.research_with_report("AMD outlook").await.unwrap();

        assert_eq!(outcome.query, "AMD outlook");
        assert_eq!(outcome.memory.facts, 2);
        assert_eq!(outcome.memory.search_queries, 1);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (mut researcher, _, _) = researcher(config(1), vec!["x"], vec![]);
        assert!(matches!(
            researcher.research("   ").await,
            Err(ResearchError::InvalidInput(_))
        ));
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_from_config_validates() {
        assert!(DeepResearcher::from_config(config(3)).is_ok());

        let mut invalid = config(3);
        invalid.similarity_threshold = 1.5;
        assert!(matches!(
            DeepResearcher::from_config(invalid),
            Err(ResearchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_reasoning_output_accepts_both_key_styles() {
        let snake: ReasoningOutput =
            serde_json::from_str(r#"{"insights": ["a"], "follow_up_questions": ["b"]}"#).unwrap();
        let camel: ReasoningOutput =
            serde_json::from_str(r#"{"insights": ["a"], "followUpQuestions": ["b"]}"#).unwrap();
        assert_eq!(snake, camel);

        let partial: ReasoningOutput = serde_json::from_str(r#"{"insights": []}"#).unwrap();
        assert!(partial.follow_up_questions.is_empty());
    }

    #[test]
    fn test_outcome_serializes() {
        tokio_test::block_on(async {
            let (mut researcher, _, _) = researcher(config(1), vec!["done"], vec![]);
            let outcome = researcher.research_with_report("NVIDIA outlook").await.unwrap();
            let json = serde_json::to_value(&outcome).unwrap();
            assert_eq!(json["answer"], "done");
            assert_eq!(json["memory"]["facts"], 0);
        });
    }
}
