//! Integration tests for the reasoning/acting research loop

use async_trait::async_trait;
use delve_core::{ChatTurn, DelveError, DelveResult, ErrorContext, GenerationOptions, LlmBackend};
use delve_research::research::{Observation, ReactConfig, ReactResearcher, ResearchSynthesizer};
use delve_research::tools::{ParamSpec, ToolSchema};
use delve_research::{ResearchError, ToolOutput, ToolParams, ToolRegistry};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// LLM backend answering each prompt kind from its own script
#[derive(Default)]
struct ScriptedLlm {
    thinking: String,
    selections: Mutex<VecDeque<String>>,
    evaluations: Mutex<VecDeque<String>>,
    next_needs: String,
    synthesis: String,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedLlm {
    fn new(thinking: &str) -> Self {
        Self {
            thinking: thinking.to_string(),
            next_needs: "1. Any remaining details".to_string(),
            synthesis: "final answer".to_string(),
            ..Default::default()
        }
    }

    fn with_selections(self, selections: &[&str]) -> Self {
        *self.selections.lock().unwrap() = selections.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_evaluations(self, evaluations: &[&str]) -> Self {
        *self.evaluations.lock().unwrap() = evaluations.iter().map(|s| s.to_string()).collect();
        self
    }

    fn prompts_starting_with(&self, prefix: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn query(&self, prompt: &str, _options: &GenerationOptions) -> DelveResult<String> {
        if self.fail {
            return Err(DelveError::Llm {
                message: "connection refused".to_string(),
                provider: Some("scripted".to_string()),
                model: None,
                context: ErrorContext::new("scripted_llm"),
            });
        }
        self.prompts.lock().unwrap().push(prompt.to_string());

        let response = if prompt.starts_with("I need to research:") {
            self.thinking.clone()
        } else if prompt.starts_with("I need to find information about:") {
            self.selections
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        } else if prompt.starts_with("I'm researching:") && prompt.contains("do I have enough") {
            self.evaluations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "Research complete: No\nMissing information:\n1. More detail".to_string())
        } else if prompt.starts_with("I'm researching:") {
            self.next_needs.clone()
        } else {
            self.synthesis.clone()
        };
        Ok(response)
    }

    async fn chat(&self, history: &[ChatTurn], options: &GenerationOptions) -> DelveResult<String> {
        let last = history.last().map(|turn| turn.content.as_str()).unwrap_or_default();
        self.query(last, options).await
    }
}

fn search_schema() -> ToolSchema {
    ToolSchema::new(vec![
        ParamSpec::new("query").with_aliases(&["q"]),
        ParamSpec::new("max_results").with_aliases(&["num_results"]),
    ])
    .with_query("query")
}

/// Registry whose `web_search` echoes its query and whose
/// `search_and_read` always fails
fn registry(calls: Arc<Mutex<Vec<(String, ToolParams)>>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let search_calls = calls.clone();
    registry.register_fn("web_search", "Search the web", search_schema(), move |params| {
        search_calls
            .lock()
            .unwrap()
            .push(("web_search".to_string(), params.clone()));
        let query = params.get("query").cloned().unwrap_or(Value::Null);
        Ok(json!({
            "query": query,
            "results": [{"title": "Result", "snippet": "snippet", "url": "https://example.com"}],
        })
        .as_object()
        .cloned()
        .unwrap_or_default())
    });

    let read_calls = calls;
    registry.register_fn(
        "search_and_read",
        "Search and read the top result",
        search_schema(),
        move |params| {
            read_calls
                .lock()
                .unwrap()
                .push(("search_and_read".to_string(), params));
            Err(ResearchError::tool_execution("search_and_read", "fetch timed out"))
        },
    );
    registry
}

fn researcher(llm: Arc<ScriptedLlm>, registry: ToolRegistry, max_iterations: usize) -> ReactResearcher {
    let config = ReactConfig::default().with_max_iterations(max_iterations);
    ReactResearcher::new(llm, Arc::new(registry), config)
}

#[tokio::test]
async fn test_failed_tool_falls_back_to_default_search() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("1. What is the Tokio runtime scheduler design?")
            .with_selections(&[
                "Tool: search_and_read\nParameters: {\"query\": \"tokio scheduler\"}",
            ])
            .with_evaluations(&["Research complete: Yes\nReasoning: covered"]),
    );

    let context = researcher(llm, registry(calls.clone()), 5)
        .research("How does Tokio schedule tasks?")
        .await
        .unwrap();

    assert_eq!(context.tools_used, vec!["search_and_read", "web_search"]);
    assert_eq!(context.findings.len(), 1);
    assert_eq!(context.findings[0].tool_name, "web_search");
    assert_eq!(
        context.findings[0].need,
        "What is the Tokio runtime scheduler design?"
    );

    let iteration = &context.iterations[0];
    assert_eq!(iteration.actions.len(), 2);
    assert!(iteration.observations[0].is_error());
    assert!(matches!(iteration.observations[1], Observation::Success { .. }));

    let calls = calls.lock().unwrap();
    assert_eq!(calls[1].1["query"], "Tokio runtime scheduler design");
    assert!(context.completed);
}

#[tokio::test]
async fn test_failing_default_tool_has_no_fallback() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = registry(calls.clone());
    registry.register_fn("web_search", "Search the web", search_schema(), |_| {
        Err(ResearchError::tool_execution("web_search", "rate limited"))
    });

    let llm = Arc::new(
        ScriptedLlm::new("1. Rust borrow checker rules")
            .with_evaluations(&["Research complete: Yes"]),
    );
    let context = researcher(llm, registry, 3).research("borrowck").await.unwrap();

    assert_eq!(context.tools_used, vec!["web_search"]);
    assert!(context.findings.is_empty());
    assert!(context.iterations[0].observations[0].is_error());
}

#[tokio::test]
async fn test_unknown_tool_is_recorded_and_falls_back() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("- Current stable Rust release")
            .with_selections(&["Tool: video_search\nParameters: {\"query\": \"rust release\"}"])
            .with_evaluations(&["Research complete: Yes"]),
    );

    let context = researcher(llm, registry(calls), 2)
        .research("latest rust")
        .await
        .unwrap();

    assert_eq!(context.tools_used, vec!["video_search", "web_search"]);
    match &context.iterations[0].observations[0] {
        Observation::Error { error, .. } => assert!(error.contains("Tool not found: video_search")),
        other => panic!("expected error observation, got {:?}", other),
    }
    assert_eq!(context.findings.len(), 1);
}

#[tokio::test]
async fn test_registry_rejects_unknown_tool() {
    let registry = registry(Arc::new(Mutex::new(Vec::new())));
    let err = registry
        .execute("nonexistent", ToolParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::ToolNotFound { ref name } if name == "nonexistent"));
}

#[tokio::test]
async fn test_loop_stops_at_max_iterations_without_completion() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(ScriptedLlm::new("1. First need\n2. Second need"));

    let context = researcher(llm.clone(), registry(calls), 3)
        .research("never satisfied")
        .await
        .unwrap();

    assert_eq!(context.iterations.len(), 3);
    assert!(!context.completed);
    assert!(context.iterations.iter().all(|iteration| !iteration.complete));
    assert_eq!(llm.prompts_starting_with("I need to research:"), 1);
}

#[tokio::test]
async fn test_resolved_needs_are_skipped_and_duplicates_collapsed() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("1. Async runtimes in Rust\n2. async runtimes in rust ")
            .with_evaluations(&[
                "Research complete: No\nMissing information:\n1. Async runtimes in Rust\n2. Runtime benchmarks",
                "Research complete: Yes",
            ]),
    );

    let context = researcher(llm, registry(calls.clone()), 5)
        .research("rust async")
        .await
        .unwrap();

    assert_eq!(context.iterations.len(), 2);
    assert_eq!(context.iterations[0].needs, vec!["Async runtimes in Rust"]);
    assert_eq!(context.iterations[1].needs, vec!["Runtime benchmarks"]);
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unparseable_selection_uses_default_tool_with_synthesized_query() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("1. What are the \"zero cost abstractions\" in Rust?")
            .with_selections(&["I would just search the web."])
            .with_evaluations(&["Research complete: Yes"]),
    );

    let context = researcher(llm, registry(calls.clone()), 2)
        .research("zero cost")
        .await
        .unwrap();

    assert_eq!(context.tools_used, vec!["web_search"]);
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].1["query"], "zero cost abstractions");
}

#[tokio::test]
async fn test_empty_missing_information_asks_for_next_needs() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("1. Initial need")
            .with_evaluations(&["Research complete: No\nMissing information: none", "Research complete: Yes"]),
    );

    let context = researcher(llm.clone(), registry(calls), 4)
        .research("topic")
        .await
        .unwrap();

    assert_eq!(llm.prompts_starting_with("I'm researching:"), 3);
    assert_eq!(context.iterations[1].needs, vec!["Any remaining details"]);
    assert!(context.completed);
}

#[tokio::test]
async fn test_phrase_heuristic_completes_without_tag() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let llm = Arc::new(
        ScriptedLlm::new("1. Need")
            .with_evaluations(&["I now have enough information to answer."]),
    );
    let context = researcher(llm, registry(calls), 5).research("q").await.unwrap();
    assert!(context.completed);
    assert_eq!(context.iterations.len(), 1);
}

#[tokio::test]
async fn test_llm_failure_propagates() {
    let llm = Arc::new(ScriptedLlm {
        fail: true,
        ..ScriptedLlm::new("")
    });
    let result = researcher(llm, registry(Arc::new(Mutex::new(Vec::new()))), 3)
        .research("q")
        .await;
    assert!(matches!(result, Err(ResearchError::Core(DelveError::Llm { .. }))));
}

#[tokio::test]
async fn test_synthesizer_switches_prompt_on_missing_content() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = registry(calls);
    registry.register_fn("web_search", "Search the web", search_schema(), |params| {
        let mut output = ToolOutput::new();
        output.insert("query".into(), params.get("query").cloned().unwrap_or(Value::Null));
        output.insert("results".into(), json!([]));
        Ok(output)
    });

    let llm = Arc::new(ScriptedLlm::new("1. Obscure topic").with_evaluations(&["Research complete: Yes"]));
    let context = researcher(llm.clone(), registry, 2).research("obscure").await.unwrap();
    let answer = ResearchSynthesizer::new(llm.clone()).synthesize(&context).await.unwrap();

    assert_eq!(answer, "final answer");
    let prompts = llm.prompts.lock().unwrap();
    let last = prompts.last().unwrap();
    assert!(last.contains("didn't yield specific information"));
}
