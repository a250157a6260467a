//! Final answer synthesis from accumulated findings

use super::prompts::{no_results_prompt, synthesis_prompt};
use super::types::{Finding, ResearchContext};
use crate::tools::ToolOutput;
use crate::web::extract::truncate_chars;
use crate::ResearchResult;
use delve_core::{GenerationOptions, LlmBackend};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const MAX_ITEMS_PER_FINDING: usize = 5;
const EXCERPT_CHARS: usize = 500;

fn non_empty_array(result: &ToolOutput, key: &str) -> bool {
    result
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty())
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Whether a tool result carries anything worth citing
pub fn has_usable_content(result: &ToolOutput) -> bool {
    let text_content = result
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|c| !c.trim().is_empty());

    text_content
        || ["results", "content", "search_results", "documents", "items"]
            .iter()
            .any(|key| non_empty_array(result, key))
}

fn push_pages(text: &mut String, pages: &[Value]) {
    for page in pages.iter().take(MAX_ITEMS_PER_FINDING) {
        text.push_str(&format!(
            "- Source: {}\n- URL: {}\n- Content excerpt: {}\n",
            str_field(page, "title"),
            str_field(page, "url"),
            truncate_chars(str_field(page, "content"), EXCERPT_CHARS)
        ));
    }
}

fn push_results(text: &mut String, results: &[Value]) {
    for item in results.iter().take(MAX_ITEMS_PER_FINDING) {
        text.push_str(&format!(
            "- {}: {}\n  URL: {}\n",
            str_field(item, "title"),
            str_field(item, "snippet"),
            str_field(item, "url")
        ));
    }
}

/// Render findings as the evidence block of the synthesis prompt
pub fn format_findings(findings: &[Finding]) -> String {
    let mut text = String::new();

    for (i, finding) in findings.iter().enumerate() {
        let result = &finding.result;
        text.push_str(&format!("Source {}: {}\n", i + 1, finding.need));

        if let Some(content) = result.get("content").and_then(Value::as_str) {
            let title = result.get("title").and_then(Value::as_str);
            let url = result.get("url").and_then(Value::as_str);
            if let Some(title) = title {
                text.push_str(&format!("- Source: {}\n", title));
            }
            if let Some(url) = url {
                text.push_str(&format!("- URL: {}\n", url));
            }
            text.push_str(&format!(
                "- Content excerpt: {}\n",
                truncate_chars(content, EXCERPT_CHARS)
            ));
        } else if let Some(pages) = result.get("content").and_then(Value::as_array) {
            push_pages(&mut text, pages);
            if pages.is_empty() {
                if let Some(results) = result.get("search_results").and_then(Value::as_array) {
                    push_results(&mut text, results);
                }
            }
        } else if let Some(results) = result.get("results").and_then(Value::as_array) {
            push_results(&mut text, results);
        } else if let Some(documents) = result.get("documents").and_then(Value::as_array) {
            for document in documents.iter().take(MAX_ITEMS_PER_FINDING) {
                text.push_str(&format!(
                    "- Document: {} ({})\n- Content excerpt: {}\n",
                    str_field(document, "title"),
                    str_field(document, "url"),
                    truncate_chars(str_field(document, "text"), EXCERPT_CHARS)
                ));
            }
        } else if let Some(items) = result.get("items").and_then(Value::as_array) {
            for item in items.iter().take(MAX_ITEMS_PER_FINDING) {
                let description = item
                    .get("description")
                    .or_else(|| item.get("snippet"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                text.push_str(&format!(
                    "- {}: {}\n  URL: {}\n",
                    str_field(item, "title"),
                    truncate_chars(description, EXCERPT_CHARS),
                    str_field(item, "url")
                ));
            }
        }
        text.push('\n');
    }

    text
}

/// Turns a research context into a final answer with one LLM call
pub struct ResearchSynthesizer {
    llm: Arc<dyn LlmBackend>,
    options: GenerationOptions,
}

impl ResearchSynthesizer {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            llm,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Produce the answer text; findings without citable content switch
    /// to the limitations prompt
    pub async fn synthesize(&self, context: &ResearchContext) -> ResearchResult<String> {
        let usable = context
            .findings
            .iter()
            .any(|finding| has_usable_content(&finding.result));

        let prompt = if usable {
            synthesis_prompt(&context.query, &format_findings(&context.findings))
        } else {
            no_results_prompt(&context.query)
        };

        info!(
            query = %context.query,
            findings = context.findings.len(),
            usable,
            "Synthesizing research answer"
        );
        Ok(self.llm.query(&prompt, &self.options).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: Value) -> ToolOutput {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_usable_content_shapes() {
        assert!(has_usable_content(&output(json!({"results": [{"title": "a"}]}))));
        assert!(has_usable_content(&output(json!({"content": "page text"}))));
        assert!(!has_usable_content(&output(json!({"results": []}))));
        assert!(!has_usable_content(&output(json!({"error": "No search results found"}))));
    }

    #[test]
    fn test_format_findings_limits_results_and_excerpts() {
        let results: Vec<Value> = (0..8)
            .map(|i| json!({"title": format!("T{}", i), "snippet": "s", "url": format!("https://e.com/{}", i)}))
            .collect();
        let findings = vec![
            Finding {
                need: "first need".to_string(),
                tool_name: "web_search".to_string(),
                result: output(json!({ "results": results })),
            },
            Finding {
                need: "second need".to_string(),
                tool_name: "fetch_webpage".to_string(),
                result: output(json!({"url": "https://e.com/page", "content": "x".repeat(800)})),
            },
        ];

        let text = format_findings(&findings);
        assert!(text.starts_with("Source 1: first need\n"));
        assert!(text.contains("https://e.com/4"));
        assert!(!text.contains("https://e.com/5"));
        assert!(text.contains("- URL: https://e.com/page\n"));
        assert!(text.contains(&format!("{}...", "x".repeat(500))));
    }
}
