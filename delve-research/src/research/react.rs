//! Reasoning/acting research loop
//!
//! Each iteration plans research needs, selects and runs one tool per
//! unresolved need and asks the LLM whether the findings suffice. The loop
//! is bounded by `max_iterations` whatever the LLM answers.

use super::params::{normalize_parameters, synthesize_query};
use super::parser::{
    parse_completion, parse_missing_information, parse_research_needs, parse_tool_selection,
    NoMatch,
};
use super::prompts::{evaluation_prompt, next_needs_prompt, thinking_prompt, tool_selection_prompt};
use super::types::{
    normalize_need, Finding, IterationRecord, Observation, ResearchContext, ToolInvocation,
};
use crate::tools::{ToolInfo, ToolParams, ToolRegistry};
use crate::ResearchResult;
use delve_core::{GenerationOptions, LlmBackend, ResearchConfig};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// Upper bound on THINK/ACT/EVALUATE rounds
    pub max_iterations: usize,
    /// Fallback tool for failed invocations and unparseable selections
    pub default_search_tool: String,
    pub options: GenerationOptions,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self::from_config(&ResearchConfig::default())
    }
}

impl ReactConfig {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            default_search_tool: config.default_search_tool.clone(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Drives the research loop over an LLM backend and a tool registry
pub struct ReactResearcher {
    llm: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    config: ReactConfig,
}

impl ReactResearcher {
    pub fn new(llm: Arc<dyn LlmBackend>, tools: Arc<ToolRegistry>, config: ReactConfig) -> Self {
        Self { llm, tools, config }
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    async fn ask(&self, prompt: &str) -> ResearchResult<String> {
        Ok(self.llm.query(prompt, &self.config.options).await?)
    }

    /// Run the loop for one query.
    ///
    /// LLM transport failures are returned to the caller. Tool failures are
    /// recorded as observations and parse failures fall back to defaults.
    pub async fn research(&self, query: &str) -> ResearchResult<ResearchContext> {
        info!(query, max_iterations = self.config.max_iterations, "Starting ReAct research");
        let tools = self.tools.list();
        let mut context = ResearchContext::new(query);

        let thinking = self.ask(&thinking_prompt(query, &tools)).await?;
        let mut needs = parse_research_needs(&thinking);

        for iteration in 0..self.config.max_iterations {
            info!(iteration = iteration + 1, needs = needs.len(), "Research iteration");
            let mut record = IterationRecord::default();

            let mut seen = HashSet::new();
            for need in needs.iter().filter(|n| seen.insert(normalize_need(n))) {
                if context.is_resolved(need) {
                    debug!(need = %need, "Skipping already researched need");
                    continue;
                }
                record.needs.push(need.clone());
                let invocation = self.select_tool(need, &tools).await?;
                self.act(&mut context, &mut record, need, invocation).await;
            }

            let evaluation = self.ask(&evaluation_prompt(query, &context.findings)).await?;
            let completion = parse_completion(&evaluation);
            record.complete = completion.complete;
            context.iterations.push(record);

            if completion.complete {
                info!(iterations = iteration + 1, signal = ?completion.signal, "Research complete");
                context.completed = true;
                break;
            }
            if iteration + 1 == self.config.max_iterations {
                break;
            }

            needs = match parse_missing_information(&evaluation) {
                Ok(missing) => missing,
                Err(NoMatch) => {
                    debug!("No missing information listed, asking for next research needs");
                    let next = self.ask(&next_needs_prompt(query, &context.findings)).await?;
                    parse_research_needs(&next)
                }
            };
        }

        if !context.completed {
            info!(
                iterations = context.iterations.len(),
                "Iteration limit reached without a completion signal"
            );
        }
        context.timestamp = chrono::Utc::now();
        Ok(context)
    }

    /// Ask for a tool and repair its parameters; unparseable answers fall
    /// back to the default search tool
    async fn select_tool(&self, need: &str, tools: &[ToolInfo]) -> ResearchResult<ToolInvocation> {
        let response = self.ask(&tool_selection_prompt(need, tools)).await?;
        let invocation = parse_tool_selection(&response).unwrap_or_else(|NoMatch| {
            debug!(need, "No tool selection found, using default search tool");
            ToolInvocation {
                tool_name: self.config.default_search_tool.clone(),
                parameters: ToolParams::new(),
            }
        });

        let schema = self.tools.schema(&invocation.tool_name).unwrap_or_default();
        let parameters = normalize_parameters(&schema, invocation.parameters, need);
        debug!(tool = %invocation.tool_name, ?parameters, "Selected tool");
        Ok(ToolInvocation {
            tool_name: invocation.tool_name,
            parameters,
        })
    }

    /// Execute one attempt and record it; returns whether it succeeded
    async fn attempt(
        &self,
        context: &mut ResearchContext,
        record: &mut IterationRecord,
        need: &str,
        invocation: ToolInvocation,
    ) -> bool {
        let tool_name = invocation.tool_name.clone();
        context.tools_used.push(tool_name.clone());
        record.actions.push(invocation.clone());

        match self.tools.execute(&tool_name, invocation.parameters).await {
            Ok(result) => {
                record.observations.push(Observation::Success {
                    tool_name: tool_name.clone(),
                    result: result.clone(),
                });
                context.findings.push(Finding {
                    need: need.to_string(),
                    tool_name,
                    result,
                });
                true
            }
            Err(e) => {
                warn!(tool = %tool_name, need, error = %e, "Tool execution failed");
                record.observations.push(Observation::Error {
                    tool_name,
                    error: format!("Tool execution failed: {}", e),
                });
                false
            }
        }
    }

    async fn act(
        &self,
        context: &mut ResearchContext,
        record: &mut IterationRecord,
        need: &str,
        invocation: ToolInvocation,
    ) {
        let failed_tool = invocation.tool_name.clone();
        if self.attempt(context, record, need, invocation).await {
            return;
        }
        if failed_tool == self.config.default_search_tool {
            return;
        }

        let fallback_tool = self.config.default_search_tool.clone();
        let query_param = self
            .tools
            .schema(&fallback_tool)
            .and_then(|schema| schema.query_parameter)
            .unwrap_or_else(|| "query".to_string());
        let mut parameters = ToolParams::new();
        parameters.insert(query_param, Value::String(synthesize_query(need)));

        info!(from = %failed_tool, to = %fallback_tool, need, "Falling back to default search tool");
        let fallback = ToolInvocation {
            tool_name: fallback_tool,
            parameters,
        };
        if !self.attempt(context, record, need, fallback).await {
            warn!(need, "Fallback search failed as well");
        }
    }
}
