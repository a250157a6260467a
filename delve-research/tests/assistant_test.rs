//! Quick research pipeline with scripted collaborators

use async_trait::async_trait;
use delve_core::{
    network_error, ChatTurn, DelveConfig, DelveResult, GenerationOptions, IndexKind, LlmBackend,
    SimilarityMetric, WebConfig,
};
use delve_indexing::DocumentProcessor;
use delve_rag::{HashingEmbedder, Retriever, VectorStore};
use delve_research::{ResearchAssistant, SearchResult, WebClient, WebResearcher};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

struct PipelineLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmBackend for PipelineLlm {
    async fn query(&self, prompt: &str, _options: &GenerationOptions) -> DelveResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("I need to research the following question") {
            Ok("1. \"tokio work stealing\"\n2. How does Tokio schedule tasks?\n3. tokio work stealing".to_string())
        } else {
            Ok("Based on my web research about \"How does Tokio schedule tasks?\", here's what I found: [SOURCE 1]".to_string())
        }
    }

    async fn chat(&self, history: &[ChatTurn], options: &GenerationOptions) -> DelveResult<String> {
        let last = history.last().map(|turn| turn.content.as_str()).unwrap_or_default();
        self.query(last, options).await
    }
}

struct PipelineWeb {
    searched: Mutex<Vec<String>>,
}

#[async_trait]
impl WebClient for PipelineWeb {
    async fn search(&self, query: &str, _max_results: usize) -> DelveResult<Vec<SearchResult>> {
        self.searched.lock().unwrap().push(query.to_string());
        let results = match query {
            "How does Tokio schedule tasks?" => vec![SearchResult::new(
                "Tokio scheduler",
                "How the scheduler works",
                "https://tokio.rs/blog/scheduler",
            )],
            "tokio work stealing" => vec![
                SearchResult::new("Tokio scheduler", "dup", "https://tokio.rs/blog/scheduler"),
                SearchResult::new("Work stealing", "Stealing tasks", "https://docs.rs/tokio/steal"),
            ],
            _ => Vec::new(),
        };
        Ok(results)
    }

    async fn fetch_content(&self, url: &str) -> DelveResult<String> {
        match url {
            "https://tokio.rs/blog/scheduler" => {
                Ok("The Tokio scheduler uses per-worker run queues.".to_string())
            }
            "https://docs.rs/tokio/steal" => {
                Ok("Idle workers steal tasks from busy workers.".to_string())
            }
            _ => Err(network_error!("not found", "pipeline_web")),
        }
    }
}

#[tokio::test]
async fn test_quick_research_merges_strategies_and_ingests() {
    let dir = tempfile::tempdir().unwrap();
    let knowledge = Arc::new(RwLock::new(Retriever::with_store(
        DocumentProcessor::new(500, 50),
        Arc::new(HashingEmbedder::default()),
        VectorStore::new(dir.path(), SimilarityMetric::Cosine, IndexKind::Flat),
        "default",
    )));

    let web = Arc::new(PipelineWeb {
        searched: Mutex::new(Vec::new()),
    });
    let researcher = Arc::new(WebResearcher::new(
        web.clone(),
        WebConfig {
            politeness_delay_ms: 0,
            ..WebConfig::default()
        },
    ));
    let llm = Arc::new(PipelineLlm {
        prompts: Mutex::new(Vec::new()),
    });

    let assistant = ResearchAssistant::new(
        llm.clone(),
        researcher,
        Some(knowledge.clone()),
        DelveConfig::default(),
    );
    let answer = assistant
        .research("How does Tokio schedule tasks?")
        .await
        .unwrap();

    assert!(answer.answer.starts_with("Based on my web research about"));
    let urls: Vec<&str> = answer.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://tokio.rs/blog/scheduler", "https://docs.rs/tokio/steal"]
    );

    // the original query and the duplicate strategy are not researched twice
    let searched = web.searched.lock().unwrap();
    assert_eq!(
        searched
            .iter()
            .filter(|q| *q == "How does Tokio schedule tasks?")
            .count(),
        1
    );
    assert_eq!(searched.iter().filter(|q| *q == "tokio work stealing").count(), 1);

    assert!(!knowledge.read().await.store().is_empty());
    let prompts = llm.prompts.lock().unwrap();
    let answer_prompt = prompts.last().unwrap();
    assert!(answer_prompt.contains("RELEVANT INFORMATION FROM KNOWLEDGE BASE:"));
    assert!(answer_prompt.contains("[SOURCE 2]"));
}
