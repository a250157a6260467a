//! Repair of LLM-chosen tool parameters

use crate::tools::{ToolParams, ToolSchema};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static INTERROGATIVE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:what|how|why|when|where|who|which)\s+(?:is|are|does|do|can|should|would|will|has|have)\s+",
    )
    .expect("valid interrogative regex")
});
static QUOTED_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quoted phrase regex"));
static CONTENT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{4,}\b").expect("valid content word regex"));

const QUERY_STOPWORDS: &[&str] = &[
    "this", "that", "these", "those", "what", "which", "when", "where", "who", "whose", "whom",
    "how", "why", "about", "with", "from", "there", "their",
];
const MIN_KEYWORDS: usize = 3;

/// Search query derived from a research need.
///
/// Quoted phrases win; otherwise the content words of the need are used,
/// unless fewer than three survive, in which case the cleaned need is kept.
pub fn synthesize_query(need: &str) -> String {
    let stripped = INTERROGATIVE_PREFIX.replace(need, "");
    let cleaned = stripped.replace('?', "");

    let phrases: Vec<&str> = QUOTED_PHRASE
        .captures_iter(&cleaned)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|phrase| !phrase.is_empty())
        .collect();
    if !phrases.is_empty() {
        return phrases.join(" ");
    }

    let keywords: Vec<&str> = CONTENT_WORD
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .filter(|word| !QUERY_STOPWORDS.contains(&word.to_lowercase().as_str()))
        .collect();
    if keywords.len() < MIN_KEYWORDS {
        return cleaned
            .replace(['"', '\''], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
    }
    keywords.join(" ")
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Map aliases to declared names, drop undeclared parameters and fill a
/// missing or blank query of a search-like tool from the need text.
///
/// A tool without declared parameters gets its parameters unchanged.
pub fn normalize_parameters(schema: &ToolSchema, params: ToolParams, need: &str) -> ToolParams {
    let mut normalized = if schema.parameters.is_empty() {
        params
    } else {
        let mut exact = ToolParams::new();
        let mut aliased = Vec::new();
        for (name, value) in params {
            match schema.resolve(&name) {
                Some(canonical) if canonical == name => {
                    exact.insert(name, value);
                }
                Some(canonical) => aliased.push((canonical.to_string(), value)),
                None => debug!(parameter = %name, "Dropping unsupported parameter"),
            }
        }
        for (canonical, value) in aliased {
            exact.entry(canonical).or_insert(value);
        }
        exact
    };

    if let Some(query_param) = &schema.query_parameter {
        if is_blank(normalized.get(query_param)) {
            let query = synthesize_query(need);
            debug!(parameter = %query_param, query = %query, "Synthesized missing query");
            normalized.insert(query_param.clone(), Value::String(query));
        }
    }

    normalized
}
