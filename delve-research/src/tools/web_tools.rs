//! Web search, page fetch and deep research tools

use super::knowledge_tools::SharedRetriever;
use super::registry::{ParamSpec, Tool, ToolOutput, ToolParams, ToolSchema};
use super::{
    param_str, require_str, result_count, timestamp, to_output, MAX_RESULTS_ALIASES,
    QUERY_ALIASES,
};
use crate::web::{WebClient, WebResearcher};
use crate::{ResearchError, ResearchResult};
use async_trait::async_trait;
use delve_rag::WebPage;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const SEARCH_AND_READ_RESULTS: usize = 3;

fn search_schema() -> ToolSchema {
    ToolSchema::new(vec![
        ParamSpec::new("query").with_aliases(QUERY_ALIASES),
        ParamSpec::new("max_results").with_aliases(MAX_RESULTS_ALIASES),
    ])
    .with_query("query")
}

fn search_failed(tool: &str, error: delve_core::DelveError) -> ResearchError {
    ResearchError::tool_execution(tool, error.to_string())
}

pub struct WebSearchTool {
    client: Arc<dyn WebClient>,
    default_results: usize,
    result_limit: usize,
}

impl WebSearchTool {
    pub fn new(client: Arc<dyn WebClient>, default_results: usize, result_limit: usize) -> Self {
        Self {
            client,
            default_results,
            result_limit,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let query = require_str(&params, "web_search", "query")?;
        let max_results = result_count(&params, self.default_results, self.result_limit);

        let results = self
            .client
            .search(&query, max_results)
            .await
            .map_err(|e| search_failed("web_search", e))?;

        Ok(to_output(json!({
            "query": query,
            "results": results,
            "timestamp": timestamp(),
        })))
    }

    fn schema(&self) -> ToolSchema {
        search_schema()
    }
}

pub struct FetchWebpageTool {
    client: Arc<dyn WebClient>,
}

impl FetchWebpageTool {
    pub fn new(client: Arc<dyn WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for FetchWebpageTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let url = require_str(&params, "fetch_webpage", "url")?;
        let content = self
            .client
            .fetch_content(&url)
            .await
            .map_err(|e| search_failed("fetch_webpage", e))?;

        Ok(to_output(json!({
            "url": url,
            "content": content,
            "timestamp": timestamp(),
        })))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ParamSpec::new("url").with_aliases(&["link", "page", "href", "webpage"])
        ])
    }
}

/// Searches and reads the top hit
pub struct SearchAndReadTool {
    client: Arc<dyn WebClient>,
    result_limit: usize,
}

impl SearchAndReadTool {
    pub fn new(client: Arc<dyn WebClient>, result_limit: usize) -> Self {
        Self {
            client,
            result_limit,
        }
    }
}

#[async_trait]
impl Tool for SearchAndReadTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let query = require_str(&params, "search_and_read", "query")?;
        let max_results = result_count(&params, SEARCH_AND_READ_RESULTS, self.result_limit);

        let results = self
            .client
            .search(&query, max_results)
            .await
            .map_err(|e| search_failed("search_and_read", e))?;

        let Some(top) = results.first() else {
            return Ok(to_output(json!({
                "query": query,
                "error": "No search results found",
                "timestamp": timestamp(),
            })));
        };
        if top.url.is_empty() {
            return Ok(to_output(json!({
                "query": query,
                "results": results,
                "error": "No URL in top result",
                "timestamp": timestamp(),
            })));
        }

        let content = self
            .client
            .fetch_content(&top.url)
            .await
            .map_err(|e| search_failed("search_and_read", e))?;

        Ok(to_output(json!({
            "query": query,
            "url": top.url,
            "title": top.title,
            "content": content,
            "timestamp": timestamp(),
        })))
    }

    fn schema(&self) -> ToolSchema {
        search_schema()
    }
}

/// Full multi-round research through [`WebResearcher`], optionally feeding
/// the fetched pages into the knowledge base
pub struct DeepResearchTool {
    researcher: Arc<WebResearcher>,
    knowledge: Option<SharedRetriever>,
}

impl DeepResearchTool {
    pub fn new(researcher: Arc<WebResearcher>, knowledge: Option<SharedRetriever>) -> Self {
        Self {
            researcher,
            knowledge,
        }
    }
}

#[async_trait]
impl Tool for DeepResearchTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let query = require_str(&params, "deep_research", "query")?;
        let report = self.researcher.research(&query).await;

        let mut output = to_output(serde_json::to_value(&report)?);

        if let Some(knowledge) = &self.knowledge {
            let pages: Vec<WebPage<'_>> = report
                .content
                .iter()
                .map(|item| WebPage {
                    url: &item.url,
                    title: Some(item.title.as_str()).filter(|t| !t.is_empty()),
                    text: &item.content,
                })
                .collect();
            match knowledge.write().await.add_web_research(&pages, None).await {
                Ok(chunks) => {
                    info!(query = %query, chunks, "Ingested research into knowledge base");
                    output.insert("ingested_chunks".to_string(), json!(chunks));
                }
                Err(e) => warn!(query = %query, error = %e, "Failed to ingest research"),
            }
        }

        Ok(output)
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![ParamSpec::new("query").with_aliases(QUERY_ALIASES)]).with_query("query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::SearchResult;
    use delve_core::{network_error, DelveResult};
    use serde_json::Value;

    struct StubClient {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl WebClient for StubClient {
        async fn search(&self, _query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
            Ok(self.results.iter().take(max_results).cloned().collect())
        }

        async fn fetch_content(&self, url: &str) -> DelveResult<String> {
            if url.contains("broken") {
                return Err(network_error!("connection reset", "stub"));
            }
            Ok(format!("content of {}", url))
        }
    }

    fn client(urls: &[&str]) -> Arc<dyn WebClient> {
        Arc::new(StubClient {
            results: urls
                .iter()
                .enumerate()
                .map(|(i, url)| SearchResult::new(format!("Result {}", i), "snippet", *url))
                .collect(),
        })
    }

    fn params(value: Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_web_search_respects_max_results() {
        let tool = WebSearchTool::new(client(&["https://a.com", "https://b.com", "https://c.com"]), 5, 15);
        let output = tool
            .call(params(json!({"query": "rust", "max_results": 2})))
            .await
            .unwrap();
        assert_eq!(output["query"], "rust");
        assert_eq!(output["results"].as_array().unwrap().len(), 2);
        assert!(output.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_web_search_caps_requested_results() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let tool = WebSearchTool::new(
            Arc::new(RecordingClient { seen: seen.clone() }),
            5,
            15,
        );
        tool.call(params(json!({"query": "rust", "max_results": 10_000})))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![15]);
    }

    struct RecordingClient {
        seen: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl WebClient for RecordingClient {
        async fn search(&self, _query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
            self.seen.lock().unwrap().push(max_results);
            Ok(Vec::new())
        }

        async fn fetch_content(&self, _url: &str) -> DelveResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_search_and_read_reads_top_result() {
        let tool = SearchAndReadTool::new(client(&["https://a.com", "https://b.com"]), 15);
        let output = tool.call(params(json!({"query": "rust"}))).await.unwrap();
        assert_eq!(output["url"], "https://a.com");
        assert_eq!(output["title"], "Result 0");
        assert_eq!(output["content"], "content of https://a.com");
    }

    #[tokio::test]
    async fn test_search_and_read_without_results() {
        let tool = SearchAndReadTool::new(client(&[]), 15);
        let output = tool.call(params(json!({"query": "nothing"}))).await.unwrap();
        assert_eq!(output["error"], "No search results found");
    }

    #[tokio::test]
    async fn test_fetch_errors_become_tool_errors() {
        let tool = SearchAndReadTool::new(client(&["https://broken.example"]), 15);
        let err = tool.call(params(json!({"query": "rust"}))).await.unwrap_err();
        assert!(matches!(err, ResearchError::ToolExecution { ref tool, .. } if tool == "search_and_read"));
    }

    #[tokio::test]
    async fn test_fetch_webpage_requires_url() {
        let tool = FetchWebpageTool::new(client(&[]));
        let err = tool.call(ToolParams::new()).await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidParameter { ref parameter, .. } if parameter == "url"));
    }
}
