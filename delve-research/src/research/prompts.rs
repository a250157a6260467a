//! Prompt templates for the research loop, the synthesizer and the quick
//! research pipeline

use super::types::Finding;
use crate::tools::{ToolInfo, ToolOutput};
use serde_json::Value;

/// Opening sentence of a synthesized answer
pub fn answer_opening(query: &str) -> String {
    format!("Based on my web research about \"{}\", here's what I found:", query)
}

/// Opening sentence of an answer when research found nothing
pub fn no_results_opening(query: &str) -> String {
    format!(
        "Based on my web research about \"{}\", I wasn't able to find specific information.",
        query
    )
}

fn tool_lines(tools: &[ToolInfo]) -> String {
    tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn thinking_prompt(query: &str, tools: &[ToolInfo]) -> String {
    format!(
        "I need to research: {query}\n\n\
         Available tools:\n{tools}\n\n\
         Based on this query, what specific information do I need to find out? \
         List 3-5 specific research needs or questions that will help answer this query comprehensively.\n\n\
         Format your response as a numbered list (1., 2., etc.) of specific questions or information needs.",
        tools = tool_lines(tools),
    )
}

pub fn tool_selection_prompt(need: &str, tools: &[ToolInfo]) -> String {
    format!(
        "I need to find information about: {need}\n\n\
         Available tools:\n{tools}\n\n\
         Which tool should I use for this specific information need, and with what parameters?\n\n\
         Select exactly one tool and specify the parameters to use.\n\
         Format your response as follows:\n\
         Tool: [tool_name]\n\
         Parameters: {{\n  \"param1\": \"value1\",\n  \"param2\": \"value2\"\n}}\n\n\
         IMPORTANT: For search tools like web_search or search_and_read, you MUST provide a specific, \
         non-empty search query that includes relevant keywords from the research need.",
        tools = tool_lines(tools),
    )
}

fn content_len(result: &ToolOutput) -> Option<usize> {
    result
        .get("content")
        .and_then(Value::as_str)
        .map(|c| c.chars().count())
}

/// One-line description of a tool result for progress evaluation
fn summarize_result(result: &ToolOutput) -> String {
    if let Some(results) = result.get("results").and_then(Value::as_array) {
        let mut summary = format!("Found {} search results", results.len());
        if !results.is_empty() {
            summary.push_str(":\n");
            for (i, item) in results.iter().take(3).enumerate() {
                let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
                summary.push_str(&format!("  {}. {}\n", i + 1, title));
            }
            if results.len() > 3 {
                summary.push_str(&format!("  ...and {} more results\n", results.len() - 3));
            }
        }
        return summary;
    }
    if let Some(chars) = content_len(result) {
        return format!("Fetched page content ({} chars)", chars);
    }
    if let Some(content) = result.get("content").and_then(Value::as_array) {
        return format!("Read {} web pages", content.len());
    }
    if let Some(documents) = result.get("documents").and_then(Value::as_array) {
        return format!("Found {} knowledge base documents", documents.len());
    }
    if let Some(items) = result.get("items").and_then(Value::as_array) {
        return format!("Aggregated {} list items", items.len());
    }

    let raw = Value::Object(result.clone()).to_string();
    if raw.chars().count() > 100 {
        format!("{}...", raw.chars().take(100).collect::<String>())
    } else {
        raw
    }
}

pub fn evaluation_prompt(query: &str, findings: &[Finding]) -> String {
    let mut findings_text = String::new();
    for (i, finding) in findings.iter().enumerate() {
        findings_text.push_str(&format!(
            "Finding {}:\n- Need: {}\n- Tool: {}\n- Result: {}\n\n",
            i + 1,
            finding.need,
            finding.tool_name,
            summarize_result(&finding.result)
        ));
    }

    format!(
        "I'm researching: {query}\n\n\
         So far, I've gathered the following information:\n\n{findings_text}\n\
         Based on this information, do I have enough to provide a comprehensive answer to the original query?\n\n\
         If yes, explain why the research is sufficient.\n\
         If no, list the specific information that is still missing and needs to be researched.\n\n\
         Format your response as follows:\n\
         Research complete: [Yes/No]\n\
         Reasoning: [Your explanation]\n\
         Missing information: [List of missing information needs, if any]"
    )
}

pub fn next_needs_prompt(query: &str, findings: &[Finding]) -> String {
    let investigated = findings
        .iter()
        .enumerate()
        .map(|(i, finding)| format!("{}. {}", i + 1, finding.need))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "I'm researching: {query}\n\n\
         So far, I've investigated these questions:\n{investigated}\n\n\
         Based on what I've learned, what additional information should I look for next to complete my research?\n\n\
         List 2-3 specific new research questions that would help fill in the gaps in my current knowledge.\n\n\
         Format your response as a numbered list of specific questions or information needs."
    )
}

pub fn synthesis_prompt(query: &str, findings_text: &str) -> String {
    format!(
        "I've researched the question: {query}\n\n\
         Based on my research, I have gathered the following information:\n\n{findings_text}\n\
         Using this information, provide a comprehensive, well-organized answer to the original question.\n\n\
         Important guidelines:\n\
         1. When referencing information from a source, include the source URL directly in your text.\n\
         2. If there are conflicting pieces of information, acknowledge them and explain which seems most reliable.\n\
         3. If some aspects of the question couldn't be answered by the research, acknowledge those limitations.\n\
         4. Start your response with: '{opening}'\n\n\
         Format your response in a clear, structured way that directly answers the original question.",
        opening = answer_opening(query),
    )
}

pub fn no_results_prompt(query: &str) -> String {
    format!(
        "I've researched the question: {query}\n\n\
         Unfortunately, my research didn't yield specific information about this topic. \
         Based on this outcome, please provide a response that:\n\n\
         1. Acknowledges the limitations of the research\n\
         2. Explains that specific information about the topic wasn't found\n\
         3. Offers general background knowledge that may still help\n\
         4. Suggests next steps the user could take to find more specific information\n\n\
         Start your response with: '{opening}'\n\n\
         Format your response in a clear, structured way that acknowledges the limitations while still being helpful.",
        opening = no_results_opening(query),
    )
}

/// Ask for alternative search queries, used by the quick research pipeline
pub fn strategies_prompt(query: &str, count: usize) -> String {
    format!(
        "I need to research the following question: {query}\n\n\
         Suggest up to {count} alternative web search queries that would find information \
         the original wording might miss. Use different keywords, narrower sub-topics or \
         authoritative source types.\n\n\
         Format your response as a numbered list with one search query per line and no commentary."
    )
}

/// Answer a question from formatted web research and knowledge base context
pub fn research_answer_prompt(query: &str, research: &str, knowledge: &str) -> String {
    let mut prompt = format!("{research}\n\n");
    if !knowledge.is_empty() {
        prompt.push_str(knowledge);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "Question: {query}\n\n\
         Answer the question using the research above. Cite sources with their [SOURCE X] \
         numbers, point out conflicting information and say clearly what the research could not answer.\n\
         Start your response with: '{opening}'",
        opening = answer_opening(query),
    ));
    prompt
}
