//! Query expansion
//!
//! Turns one research query into several related search queries with a
//! structured model call. When the reply does not fit the schema, the raw
//! text goes through an ordered list of extraction strategies; the first
//! one that yields queries wins, and the original query is the last resort.

use crate::llm::{
    FieldType, Metered, ModelInterface, SchemaField, StructuredOutput, StructuredResponse,
};
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const EXPANSION_TEMPERATURE: f32 = 0.5;

const SYSTEM_PROMPT: &str = r#"You are a query expansion expert. Your task is to expand a given query into multiple related queries that would help gather comprehensive information about the topic. Follow these guidelines:
1. Generate search queries that cover different aspects of the topic.
2. Ensure each query is specific and focused.
3. Include variations using different terminology.
4. Consider related topics that would provide useful context.
5. Output ONLY the expanded queries in a JSON list format, nothing else."#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpandedQueries {
    pub queries: Vec<String>,
}

impl StructuredResponse for ExpandedQueries {
    fn schema() -> &'static [SchemaField] {
        const FIELDS: &[SchemaField] = &[SchemaField::new(
            "queries",
            FieldType::StringArray,
            "List of expanded search queries",
        )];
        FIELDS
    }
}

/// A raw-text extraction strategy
type Extractor = fn(&str) -> Option<Vec<String>>;

/// Tried in order on raw text when structured parsing fails
const RAW_TEXT_STRATEGIES: &[(&str, Extractor)] = &[
    ("bracketed_list", extract_bracketed_list),
    ("line_split", split_lines),
];

pub struct QueryExpansionTool {
    model: Arc<ModelInterface>,
}

impl QueryExpansionTool {
    pub fn new(model: Arc<ModelInterface>) -> Self {
        Self { model }
    }

    /// Expand `query` into related search queries (3-5 requested, not enforced)
    pub async fn expand_query(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<Metered<Vec<String>>> {
        let mut prompt = format!("Original query: {}", query);
        if let Some(context) = context {
            prompt.push_str(&format!("\nContext: {}", context));
        }
        prompt.push_str(
            "\nGenerate 3-5 expanded search queries that will help find comprehensive information about this topic.",
        );

        let output = self
            .model
            .generate_structured::<ExpandedQueries>(
                &prompt,
                Some(SYSTEM_PROMPT),
                Some(EXPANSION_TEMPERATURE),
            )
            .await?;

        Ok(output.map(|output| resolve_expansion(output, query)))
    }
}

/// Pick the expanded queries out of a structured result
pub fn resolve_expansion(
    output: StructuredOutput<ExpandedQueries>,
    original: &str,
) -> Vec<String> {
    match output {
        StructuredOutput::Parsed(expanded) => {
            let queries = clean(expanded.queries);
            if queries.is_empty() {
                vec![original.to_string()]
            } else {
                queries
            }
        }
        StructuredOutput::Degraded { text, error } => {
            warn!(error = %error, "Query expansion fell back to raw text");
            recover_queries(&text, original)
        }
    }
}

/// Run the raw-text strategies in order, falling back to the original query
pub fn recover_queries(raw: &str, original: &str) -> Vec<String> {
    for (name, strategy) in RAW_TEXT_STRATEGIES {
        if let Some(queries) = strategy(raw) {
            debug!(
                strategy = *name,
                count = queries.len(),
                "Recovered expanded queries"
            );
            return queries;
        }
    }

    vec![original.to_string()]
}

/// Parse the text between the first `[` and the last `]` as a JSON array
pub fn extract_bracketed_list(raw: &str) -> Option<Vec<String>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }

    let items: Vec<serde_json::Value> = serde_json::from_str(&raw[start..=end]).ok()?;
    let queries = clean(
        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    );

    (!queries.is_empty()).then_some(queries)
}

/// Every trimmed non-empty line is a query
pub fn split_lines(raw: &str) -> Option<Vec<String>> {
    let queries: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    (!queries.is_empty()).then_some(queries)
}

fn clean(queries: Vec<String>) -> Vec<String> {
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn tool(replies: Vec<&str>) -> (QueryExpansionTool, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(
            replies.into_iter().map(str::to_string).collect(),
        ));
        let interface = Arc::new(ModelInterface::new(model.clone()));
        (QueryExpansionTool::new(interface), model)
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let (tool, model) = tool(vec![
            r#"{"queries": ["NVDA earnings", "NVDA data center demand"]}"#,
        ]);

        let expanded = tool.expand_query("NVIDIA outlook", None).await.unwrap();
        assert_eq!(
            expanded.value,
            vec!["NVDA earnings", "NVDA data center demand"]
        );
        assert!(expanded.tokens > 0);

        let request = &model.requests()[0];
        assert!(request.prompt.starts_with("Original query: NVIDIA outlook"));
        assert_eq!(request.temperature, Some(EXPANSION_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_context_included_in_prompt() {
        let (tool, model) = tool(vec![r#"{"queries": ["a"]}"#]);
        tool.expand_query("q", Some("semiconductors")).await.unwrap();
        assert!(model.requests()[0]
            .prompt
            .contains("\nContext: semiconductors"));
    }

    #[tokio::test]
    async fn test_bracketed_list_fallback() {
        let (tool, _) = tool(vec!["Here: [\"q1\", \"q2\"]"]);
        let queries = tool.expand_query("original", None).await.unwrap().value;
        assert_eq!(queries, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_line_split_fallback() {
        let (tool, _) = tool(vec!["q1\nq2\n"]);
        let queries = tool.expand_query("original", None).await.unwrap().value;
        assert_eq!(queries, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_empty_reply_returns_original() {
        let (tool, _) = tool(vec![""]);
        let queries = tool.expand_query("original", None).await.unwrap().value;
        assert_eq!(queries, vec!["original"]);
    }

    #[test]
    fn test_strategies_individually() {
        assert_eq!(extract_bracketed_list("no list"), None);
        assert_eq!(extract_bracketed_list("] backwards ["), None);
        assert_eq!(extract_bracketed_list("[not json]"), None);
        assert_eq!(extract_bracketed_list("[]"), None);
        assert_eq!(
            extract_bracketed_list("x [\"a\", 2] y"),
            Some(vec!["a".to_string(), "2".to_string()])
        );

        assert_eq!(split_lines("  \n \n"), None);
        assert_eq!(
            split_lines(" one \n\ntwo"),
            Some(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[test]
    fn test_bracket_parse_failure_falls_to_lines() {
        let queries = recover_queries("[broken\nsecond line", "original");
        assert_eq!(queries, vec!["[broken", "second line"]);
    }

    #[test]
    fn test_parsed_but_empty_returns_original() {
        let output = StructuredOutput::Parsed(ExpandedQueries {
            queries: vec![" ".to_string()],
        });
        assert_eq!(resolve_expansion(output, "original"), vec!["original"]);
    }
}
