//! High-level research entry points used by the CLI
//!
//! [`ResearchAssistant::research`] is the quick pipeline: a few alternative
//! search strategies, one web research run per strategy, one answer call.
//! [`ResearchAssistant::react_research`] runs the full reasoning/acting loop.

use super::parser::parse_list;
use super::prompts::{research_answer_prompt, strategies_prompt};
use super::react::{ReactConfig, ReactResearcher};
use super::synthesizer::ResearchSynthesizer;
use super::types::ResearchContext;
use crate::tools::{default_registry, SharedRetriever, ToolRegistry};
use crate::web::{format_research_for_prompt, WebResearchReport, WebResearcher};
use crate::ResearchResult;
use delve_core::{DelveConfig, GenerationOptions, LlmBackend};
use delve_rag::{format_context_for_prompt, WebPage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A source cited by a quick research answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchAnswer {
    pub query: String,
    pub answer: String,
    pub sources: Vec<AnswerSource>,
}

pub struct ResearchAssistant {
    llm: Arc<dyn LlmBackend>,
    web: Arc<WebResearcher>,
    registry: Arc<ToolRegistry>,
    knowledge: Option<SharedRetriever>,
    config: DelveConfig,
}

impl ResearchAssistant {
    /// Build an assistant with the default tool set
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        web: Arc<WebResearcher>,
        knowledge: Option<SharedRetriever>,
        config: DelveConfig,
    ) -> Self {
        let registry = Arc::new(default_registry(web.clone(), knowledge.clone()));
        Self::with_registry(llm, web, registry, knowledge, config)
    }

    pub fn with_registry(
        llm: Arc<dyn LlmBackend>,
        web: Arc<WebResearcher>,
        registry: Arc<ToolRegistry>,
        knowledge: Option<SharedRetriever>,
        config: DelveConfig,
    ) -> Self {
        Self {
            llm,
            web,
            registry,
            knowledge,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions::default().with_temperature(self.config.llm.temperature)
    }

    /// Alternative search queries suggested by the LLM, never the query itself
    async fn strategies(&self, query: &str) -> ResearchResult<Vec<String>> {
        let max = self.config.research.max_strategies;
        if max == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .llm
            .query(&strategies_prompt(query, max), &self.options())
            .await?;

        let original = query.trim().to_lowercase();
        let mut seen = HashSet::new();
        let strategies = parse_list(&response)
            .map(|parsed| parsed.items)
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.trim_matches(|c: char| c == '"' || c == '\'').trim().to_string())
            .filter(|item| !item.is_empty())
            .filter(|item| item.to_lowercase() != original)
            .filter(|item| seen.insert(item.to_lowercase()))
            .take(max)
            .collect();
        Ok(strategies)
    }

    /// Quick research: strategies, one web research run each, merged report,
    /// optional knowledge base context, one answer
    pub async fn research(&self, query: &str) -> ResearchResult<ResearchAnswer> {
        let strategies = self.strategies(query).await?;
        info!(query, strategies = strategies.len(), "Starting quick research");

        let mut report = self.web.research(query).await;
        for strategy in &strategies {
            let extra = self.web.research(strategy).await;
            merge_reports(&mut report, extra);
        }

        let mut knowledge_context = String::new();
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

            let mut retriever = knowledge.write().await;
            if let Err(e) = retriever.add_web_research(&pages, None).await {
                warn!(query, error = %e, "Failed to ingest research into knowledge base");
            }
            match retriever.query(query, self.config.retrieval.top_k).await {
                Ok(results) => knowledge_context = format_context_for_prompt(&results),
                Err(e) => warn!(query, error = %e, "Knowledge base lookup failed"),
            }
        }

        let prompt = research_answer_prompt(
            query,
            &format_research_for_prompt(&report),
            &knowledge_context,
        );
        let answer = self.llm.query(&prompt, &self.options()).await?;

        let sources = report
            .content
            .iter()
            .map(|item| AnswerSource {
                title: item.title.clone(),
                url: item.url.clone(),
            })
            .collect();

        Ok(ResearchAnswer {
            query: query.to_string(),
            answer,
            sources,
        })
    }

    /// Full reasoning/acting research followed by synthesis
    pub async fn react_research(
        &self,
        query: &str,
        max_iterations: Option<usize>,
    ) -> ResearchResult<ResearchContext> {
        let mut react_config = ReactConfig::from_config(&self.config.research);
        react_config.options = self.options();
        if let Some(max) = max_iterations {
            react_config = react_config.with_max_iterations(max);
        }

        let researcher = ReactResearcher::new(self.llm.clone(), self.registry.clone(), react_config);
        let mut context = researcher.research(query).await?;

        let synthesizer = ResearchSynthesizer::new(self.llm.clone()).with_options(self.options());
        context.final_answer = Some(synthesizer.synthesize(&context).await?);
        Ok(context)
    }
}

/// Fold `extra` into `report`, skipping results and pages already present
pub fn merge_reports(report: &mut WebResearchReport, extra: WebResearchReport) {
    let mut result_urls: HashSet<String> = report
        .search_results
        .iter()
        .map(|r| r.url.clone())
        .collect();
    for result in extra.search_results {
        if result_urls.insert(result.url.clone()) {
            report.search_results.push(result);
        }
    }

    let mut content_urls: HashSet<String> =
        report.content.iter().map(|c| c.url.clone()).collect();
    for item in extra.content {
        if content_urls.insert(item.url.clone()) {
            report.content.push(item);
        }
    }
}
