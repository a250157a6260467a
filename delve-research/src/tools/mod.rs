//! Tool registry and the research tools built on the web engine and the
//! knowledge base

pub mod knowledge_tools;
pub mod list_tools;
pub mod registry;
pub mod web_tools;

pub use knowledge_tools::{KnowledgeBaseSearchTool, SharedRetriever};
pub use list_tools::{AggregateListTool, FindListTool};
pub use registry::{ParamSpec, Tool, ToolInfo, ToolOutput, ToolParams, ToolRegistry, ToolSchema};
pub use web_tools::{DeepResearchTool, FetchWebpageTool, SearchAndReadTool, WebSearchTool};

use crate::web::WebResearcher;
use crate::{ResearchError, ResearchResult};
use serde_json::Value;
use std::sync::Arc;

pub(crate) const QUERY_ALIASES: &[&str] = &["q", "search", "search_query", "keywords", "topic"];
pub(crate) const MAX_RESULTS_ALIASES: &[&str] = &["num_results", "limit", "count", "n"];

/// String parameter; numbers and booleans are accepted in their text form
pub(crate) fn param_str(params: &ToolParams, name: &str) -> Option<String> {
    let text = match params.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Count parameter; accepts integers, floats and numeric strings
pub(crate) fn param_usize(params: &ToolParams, name: &str) -> Option<usize> {
    match params.get(name)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `max_results` as requested, or `default`, kept within `1..=ceiling`
pub(crate) fn result_count(params: &ToolParams, default: usize, ceiling: usize) -> usize {
    param_usize(params, "max_results")
        .unwrap_or(default)
        .clamp(1, ceiling.max(1))
}

pub(crate) fn require_str(params: &ToolParams, tool: &str, name: &str) -> ResearchResult<String> {
    param_str(params, name).ok_or_else(|| ResearchError::invalid_parameter(tool, name))
}

/// Turn a `json!` object into a tool output mapping
pub(crate) fn to_output(value: Value) -> ToolOutput {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ToolOutput::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

pub(crate) fn timestamp() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

/// Registry with every built-in tool; `knowledge_base_search` is only
/// available when a knowledge base is attached
pub fn default_registry(
    researcher: Arc<WebResearcher>,
    knowledge: Option<SharedRetriever>,
) -> ToolRegistry {
    let client = Arc::clone(researcher.client());
    let web = researcher.config().clone();
    let mut registry = ToolRegistry::new();

    registry.register(
        "web_search",
        "Search the web for information on a specific topic",
        WebSearchTool::new(
            Arc::clone(&client),
            web.max_search_results,
            web.primary_results,
        ),
    );
    registry.register(
        "fetch_webpage",
        "Fetch and extract content from a webpage",
        FetchWebpageTool::new(Arc::clone(&client)),
    );
    registry.register(
        "search_and_read",
        "Search the web and read the most relevant page",
        SearchAndReadTool::new(Arc::clone(&client), web.primary_results),
    );
    registry.register(
        "find_list",
        "Find a list of items on a specific topic",
        FindListTool::new(Arc::clone(&client), web.politeness_delay_ms),
    );
    registry.register(
        "aggregate_list",
        "Aggregate and deduplicate list items from multiple sources",
        AggregateListTool,
    );
    registry.register(
        "deep_research",
        "Run multi-round web research with follow-up searches and read the best pages",
        DeepResearchTool::new(researcher, knowledge.clone()),
    );
    if let Some(retriever) = knowledge {
        registry.register(
            "knowledge_base_search",
            "Search previously ingested documents in the local knowledge base",
            KnowledgeBaseSearchTool::new(retriever),
        );
    }

    registry
}
