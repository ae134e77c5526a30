//! Research tools
//!
//! The news-search collaborator and the query expansion tool.
//! HTTP-backed search calls Yahoo Finance's public search endpoint.

use crate::error::ResearchError;
use crate::models::Article;
use crate::Result;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub mod query_expansion;

pub use query_expansion::{ExpandedQueries, QueryExpansionTool};

pub const YAHOO_FINANCE_PROVIDER: &str = "Yahoo Finance News";

const YAHOO_SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";

/// Trait for the news-search collaborator
#[async_trait::async_trait]
pub trait NewsSearch: Send + Sync {
    /// Provider label used in fact sources
    fn provider(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<Article>>;

    async fn search_ticker(&self, ticker: &str) -> Result<Vec<Article>> {
        self.search(ticker).await
    }

    async fn search_company(&self, company_name: &str) -> Result<Vec<Article>> {
        self.search(company_name).await
    }
}

/// Finance news from Yahoo Finance search
pub struct YahooFinanceNews {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl YahooFinanceNews {
    pub fn new(max_results: usize) -> Result<Self> {
        Self::with_base_url(YAHOO_SEARCH_URL, max_results)
    }

    pub fn with_base_url(base_url: &str, max_results: usize) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            // Yahoo rejects requests without a browser-like agent
            .user_agent("Mozilla/5.0 (compatible; stock-deep-research/0.1)")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            max_results,
        })
    }
}

#[async_trait::async_trait]
impl NewsSearch for YahooFinanceNews {
    fn provider(&self) -> &str {
        YAHOO_FINANCE_PROVIDER
    }

    async fn search(&self, query: &str) -> Result<Vec<Article>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let news_count = self.max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("quotesCount", "0"),
                ("newsCount", news_count.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ResearchError::SearchError(format!("News request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::SearchError(format!(
                "News search returned {}: {}",
                status, body
            )));
        }

        let body: YahooSearchResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::SearchError(format!("Invalid JSON response: {}", e)))?;

        let articles = articles_from_response(body, self.max_results);
        debug!(query = %query, count = articles.len(), "News search complete");

        Ok(articles)
    }
}

#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooNewsItem {
    title: String,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    provider_publish_time: Option<i64>,
    #[serde(default)]
    related_tickers: Vec<String>,
}

fn articles_from_response(response: YahooSearchResponse, max_results: usize) -> Vec<Article> {
    response
        .news
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .take(max_results)
        .map(|item| Article {
            title: item.title.trim().to_string(),
            content: describe_news_item(&item),
            source: item
                .publisher
                .clone()
                .unwrap_or_else(|| YAHOO_FINANCE_PROVIDER.to_string()),
        })
        .collect()
}

fn describe_news_item(item: &YahooNewsItem) -> String {
    let mut parts = Vec::new();

    if let Some(publisher) = &item.publisher {
        parts.push(format!("Published by {}", publisher));
    }
    if let Some(ts) = item.provider_publish_time {
        if let Some(published) = Utc.timestamp_opt(ts, 0).single() {
            parts.push(format!("on {}", published.format("%Y-%m-%d %H:%M UTC")));
        }
    }

    let mut text = parts.join(" ");
    if !item.related_tickers.is_empty() {
        if !text.is_empty() {
            text.push_str(". ");
        }
        text.push_str(&format!("Related tickers: {}", item.related_tickers.join(", ")));
    }
    if let Some(link) = &item.link {
        if !text.is_empty() {
            text.push_str(". ");
        }
        text.push_str(link);
    }

    text
}
