//! Knowledge base search over previously ingested documents

use super::registry::{ParamSpec, Tool, ToolOutput, ToolParams, ToolSchema};
use super::{param_usize, require_str, to_output, QUERY_ALIASES};
use crate::ResearchResult;
use async_trait::async_trait;
use delve_rag::Retriever;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Retriever shared between tools and the research pipeline
pub type SharedRetriever = Arc<RwLock<Retriever>>;

const DEFAULT_K: usize = 5;

pub struct KnowledgeBaseSearchTool {
    retriever: SharedRetriever,
}

impl KnowledgeBaseSearchTool {
    pub fn new(retriever: SharedRetriever) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseSearchTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let query = require_str(&params, "knowledge_base_search", "query")?;
        let k = param_usize(&params, "k").unwrap_or(DEFAULT_K);

        let results = self.retriever.read().await.query(&query, k).await?;
        let documents: Vec<_> = results
            .iter()
            .map(|(document, score)| {
                json!({
                    "text": document.text,
                    "url": document.url(),
                    "title": document.title(),
                    "score": score,
                })
            })
            .collect();

        Ok(to_output(json!({
            "query": query,
            "documents": documents,
        })))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ParamSpec::new("query").with_aliases(QUERY_ALIASES),
            ParamSpec::new("k").with_aliases(&["top_k", "limit", "num_results", "max_results"]),
        ])
        .with_query("query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::{IndexKind, SimilarityMetric};
    use delve_indexing::DocumentProcessor;
    use delve_rag::{HashingEmbedder, VectorStore};

    #[tokio::test]
    async fn test_knowledge_base_search() {
        let dir = tempfile::tempdir().unwrap();
        let mut retriever = Retriever::with_store(
            DocumentProcessor::new(500, 50),
            Arc::new(HashingEmbedder::default()),
            VectorStore::new(dir.path(), SimilarityMetric::Cosine, IndexKind::Flat),
            "default",
        );
        retriever
            .add_web_content(
                "Ferris is the unofficial mascot of the Rust community.",
                "https://rustacean.net",
                Some("Ferris"),
                None,
            )
            .await
            .unwrap();
        retriever
            .add_web_content(
                "Sourdough needs a mature starter and a long fermentation.",
                "https://bread.example",
                None,
                None,
            )
            .await
            .unwrap();

        let tool = KnowledgeBaseSearchTool::new(Arc::new(RwLock::new(retriever)));
        let params = json!({"query": "rust mascot ferris", "k": 1})
            .as_object()
            .unwrap()
            .clone();
        let output = tool.call(params).await.unwrap();

        let documents = output["documents"].as_array().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["url"], "https://rustacean.net");
        assert_eq!(documents[0]["title"], "Ferris");
    }
}
