//! Parsers for free-form LLM output.
//!
//! Every parser has an ordered fallback chain and returns either the parsed
//! value or [`NoMatch`]; callers pick their own default. Nothing here talks
//! to an LLM, so the whole module is unit-testable.

use super::types::ToolInvocation;
use crate::tools::ToolParams;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// No rule of the chain matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatch;

pub type ParseResult<T> = Result<T, NoMatch>;

/// Rule of the list chain that produced the items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRule {
    Numbered,
    Bulleted,
    Paragraphs,
    Sentences,
    Lines,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedList {
    pub items: Vec<String>,
    pub rule: ListRule,
}

static NUMBERED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+(.*)$").expect("valid numbered marker regex"));
static BULLET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*•]\s+(.*)$").expect("valid bullet marker regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));
static MISSING_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)missing\s+information\**\s*:\s*\**(.*?)(?:\n\s*\n|$)")
        .expect("valid missing section regex")
});
static COMPLETION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)research\s+complete\**\s*:?\s*\**\s*\[?\s*(yes|no)\b")
        .expect("valid completion tag regex")
});
static SUFFICIENCY_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:research is complete|sufficient information|enough information)\b")
        .expect("valid sufficiency regex")
});
static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btool\**\s*:\s*\**\s*[\[`'"]?([A-Za-z_][\w-]*)"#).expect("valid tool regex")
});
static PARAMETERS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)parameters\**\s*:?").expect("valid parameters regex"));
static QUOTED_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'](\w+)["']\s*:\s*["']([^"']*)["']"#).expect("valid quoted pair regex")
});
static NUMERIC_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'](\w+)["']\s*:\s*(-?\d+(?:\.\d+)?)\b"#).expect("valid numeric pair regex")
});
static LOOSE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*[-*]?\s*(\w+)\s*:\s*"?([^",\n]+)"?"#).expect("valid loose pair regex")
});
static QUERY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:search for|research)\s*:\s*"?([^"\n]+)"?"#).expect("valid query hint regex")
});
static URL_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:url|webpage|site|link)\s*:\s*"?(https?://[^\s"]+)"#)
        .expect("valid url hint regex")
});

/// Words that negate a sufficiency phrase when they appear just before it
const NEGATIONS: &[&str] = &[
    "not", "no", "don't", "dont", "doesn't", "isn't", "lack", "lacking", "without", "never",
    "insufficient",
];
const EMPTY_MARKERS: &[&str] = &["none", "n/a", "na", "nothing", "none needed", "no missing information"];

fn clean_item(item: &str) -> String {
    let item = item.trim();
    let item = item
        .strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**"))
        .unwrap_or(item);
    item.trim().to_string()
}

/// Items introduced by `marker` at line start; continuation lines join the
/// current item and a blank line ends it
fn marker_items(text: &str, marker: &Regex) -> Vec<String> {
    let mut items = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        if let Some(caps) = marker.captures(line) {
            items.extend(current.take());
            current = Some(caps[1].trim().to_string());
        } else if line.trim().is_empty() {
            items.extend(current.take());
        } else if let Some(item) = current.as_mut() {
            item.push(' ');
            item.push_str(line.trim());
        }
    }
    items.extend(current);

    items
        .iter()
        .map(|item| clean_item(item))
        .filter(|item| !item.is_empty())
        .collect()
}

fn paragraph_items(text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = BLANK_LINES
        .split(text.trim())
        .map(|p| clean_item(&p.split_whitespace().collect::<Vec<_>>().join(" ")))
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.len() > 1 {
        paragraphs
    } else {
        Vec::new()
    }
}

fn sentence_items(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().count() > 10)
        .map(|s| format!("{}.", s.split_whitespace().collect::<Vec<_>>().join(" ")))
        .collect()
}

fn first_match(text: &str, rules: &[ListRule]) -> ParseResult<ParsedList> {
    for &rule in rules {
        let items = match rule {
            ListRule::Numbered => marker_items(text, &NUMBERED_MARKER),
            ListRule::Bulleted => marker_items(text, &BULLET_MARKER),
            ListRule::Paragraphs => paragraph_items(text),
            ListRule::Sentences => sentence_items(text),
            ListRule::Lines => text
                .lines()
                .map(clean_item)
                .filter(|line| !line.is_empty())
                .collect(),
        };
        if !items.is_empty() {
            return Ok(ParsedList { items, rule });
        }
    }
    Err(NoMatch)
}

/// Numbered items, then bullets, then paragraphs, then sentences
pub fn parse_list(text: &str) -> ParseResult<ParsedList> {
    first_match(
        text,
        &[
            ListRule::Numbered,
            ListRule::Bulleted,
            ListRule::Paragraphs,
            ListRule::Sentences,
        ],
    )
}

/// Research needs from a planning response; empty when nothing parses
pub fn parse_research_needs(text: &str) -> Vec<String> {
    match parse_list(text) {
        Ok(list) => {
            debug!(rule = ?list.rule, count = list.items.len(), "Parsed research needs");
            list.items
        }
        Err(NoMatch) => {
            debug!("No research needs found in response");
            Vec::new()
        }
    }
}

fn is_empty_marker(item: &str) -> bool {
    let normalized = item
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    normalized.is_empty() || EMPTY_MARKERS.contains(&normalized.as_str())
}

/// Items of the `Missing information:` section: numbered, then bullets, then lines
pub fn parse_missing_information(text: &str) -> ParseResult<Vec<String>> {
    let section = MISSING_SECTION
        .captures(text)
        .map(|caps| caps[1].to_string())
        .ok_or(NoMatch)?;

    let list = first_match(
        &section,
        &[ListRule::Numbered, ListRule::Bulleted, ListRule::Lines],
    )?;
    let items: Vec<String> = list
        .items
        .into_iter()
        .filter(|item| !is_empty_marker(item))
        .collect();

    if items.is_empty() {
        Err(NoMatch)
    } else {
        Ok(items)
    }
}

/// Which signal decided the completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// `Research complete: Yes/No`
    ExplicitTag,
    /// Keyword heuristic over the raw text; can produce false positives
    Phrase,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub complete: bool,
    pub signal: CompletionSignal,
}

fn is_negated(text: &str, phrase_start: usize) -> bool {
    text[..phrase_start]
        .split_whitespace()
        .rev()
        .take(4)
        .any(|word| {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase();
            NEGATIONS.contains(&word.as_str())
        })
}

/// Completion status: the explicit tag wins; otherwise an un-negated
/// sufficiency phrase counts as complete
pub fn parse_completion(text: &str) -> Completion {
    // an echoed "[Yes/No]" placeholder is not an answer
    let tag = COMPLETION_TAG.captures_iter(text).find(|caps| {
        caps.get(0)
            .is_some_and(|m| !text[m.end()..].trim_start().starts_with('/'))
    });
    if let Some(caps) = tag {
        return Completion {
            complete: caps[1].eq_ignore_ascii_case("yes"),
            signal: CompletionSignal::ExplicitTag,
        };
    }

    let phrase = SUFFICIENCY_PHRASE
        .find_iter(text)
        .any(|m| !is_negated(text, m.start()));
    if phrase {
        debug!("Completion inferred from a sufficiency phrase");
        return Completion {
            complete: true,
            signal: CompletionSignal::Phrase,
        };
    }

    Completion {
        complete: false,
        signal: CompletionSignal::Default,
    }
}

/// Byte range of the `{...}` block starting at `open`, respecting strings
fn balanced_block(text: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[open..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' => in_string = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open..open + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn json_object(block: &str) -> Option<ToolParams> {
    let parsed = serde_json::from_str::<Value>(block)
        .or_else(|_| serde_json::from_str::<Value>(&block.replace('\'', "\"")))
        .ok()?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn pair_params(block: &str) -> ToolParams {
    let mut params = ToolParams::new();
    for caps in QUOTED_PAIR.captures_iter(block) {
        params.insert(caps[1].to_string(), Value::String(caps[2].to_string()));
    }
    for caps in NUMERIC_PAIR.captures_iter(block) {
        if let Ok(number) = serde_json::from_str::<Value>(&caps[2]) {
            params.entry(caps[1].to_string()).or_insert(number);
        }
    }
    params
}

fn loose_params(text: &str) -> ToolParams {
    let mut params = ToolParams::new();
    for caps in LOOSE_PAIR.captures_iter(text) {
        let key = caps[1].to_string();
        if matches!(key.to_lowercase().as_str(), "tool" | "parameters") {
            continue;
        }
        let value = caps[2].trim();
        if !value.is_empty() {
            params
                .entry(key)
                .or_insert_with(|| Value::String(value.to_string()));
        }
    }
    params
}

/// Tool name and parameters from a selection response.
///
/// Parameters come from the `Parameters:` JSON block, then quoted key/value
/// pairs inside it, then `key: value` lines anywhere in the response.
pub fn parse_tool_selection(text: &str) -> ParseResult<ToolInvocation> {
    let caps = TOOL_NAME.captures(text).ok_or(NoMatch)?;
    let tool_name = caps[1].to_lowercase().replace('-', "_");

    let block = PARAMETERS_LABEL
        .find(text)
        .and_then(|label| text[label.end()..].find('{').map(|i| label.end() + i))
        .and_then(|open| balanced_block(text, open));

    let mut parameters = match block {
        Some(block) => json_object(block).unwrap_or_else(|| {
            debug!("Parameters block is not valid JSON, using key/value pairs");
            pair_params(block)
        }),
        None => ToolParams::new(),
    };
    if parameters.is_empty() {
        parameters = loose_params(text);
    }

    if !parameters.contains_key("query") {
        if let Some(hint) = QUERY_HINT.captures(text) {
            parameters.insert("query".into(), Value::String(hint[1].trim().to_string()));
        }
    }
    if !parameters.contains_key("url") {
        if let Some(hint) = URL_HINT.captures(text) {
            parameters.insert("url".into(), Value::String(hint[1].to_string()));
        }
    }

    Ok(ToolInvocation {
        tool_name,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbered_needs_with_continuations() {
        let text = "Here is what to find:\n\n1. What is Tokio?\n2) How does the\n   scheduler work?\n\n3. **Benchmarks** vs async-std\n";
        let list = parse_list(text).unwrap();
        assert_eq!(list.rule, ListRule::Numbered);
        assert_eq!(
            list.items,
            vec![
                "What is Tokio?",
                "How does the scheduler work?",
                "**Benchmarks** vs async-std",
            ]
        );
    }

    #[test]
    fn test_bold_items_are_unwrapped() {
        let list = parse_list("- **Release history**\n- adoption").unwrap();
        assert_eq!(list.rule, ListRule::Bulleted);
        assert_eq!(list.items, vec!["Release history", "adoption"]);
    }

    #[test]
    fn test_paragraph_and_sentence_fallbacks() {
        let paragraphs = parse_list("Find the release date\n\nFind the license").unwrap();
        assert_eq!(paragraphs.rule, ListRule::Paragraphs);
        assert_eq!(paragraphs.items.len(), 2);

        let sentences = parse_list("Find the release date. Check it. Find the license terms!").unwrap();
        assert_eq!(sentences.rule, ListRule::Sentences);
        assert_eq!(
            sentences.items,
            vec!["Find the release date.", "Find the license terms."]
        );

        assert_eq!(parse_list("ok"), Err(NoMatch));
        assert!(parse_research_needs("").is_empty());
    }

    #[test]
    fn test_parse_missing_information() {
        let text = "Research complete: No\nReasoning: pricing unclear\nMissing information:\n1. Pricing tiers\n2. Free plan limits\n\nThanks";
        assert_eq!(
            parse_missing_information(text).unwrap(),
            vec!["Pricing tiers", "Free plan limits"]
        );

        let inline = "Research complete: No\nMissing information: official benchmark numbers";
        assert_eq!(
            parse_missing_information(inline).unwrap(),
            vec!["official benchmark numbers"]
        );

        assert_eq!(parse_missing_information("Missing information: None."), Err(NoMatch));
        assert_eq!(parse_missing_information("All good"), Err(NoMatch));
    }

    #[test]
    fn test_parse_completion() {
        let tagged = parse_completion("**Research complete:** Yes\nReasoning: all covered");
        assert_eq!(tagged, Completion { complete: true, signal: CompletionSignal::ExplicitTag });

        let tag_wins = parse_completion("Research complete: No. We have sufficient information on history.");
        assert!(!tag_wins.complete);
        assert_eq!(tag_wins.signal, CompletionSignal::ExplicitTag);

        let phrase = parse_completion("I believe the research is complete now.");
        assert_eq!(phrase.signal, CompletionSignal::Phrase);
        assert!(phrase.complete);

        let negated = parse_completion("I do not have sufficient information yet.");
        assert!(!negated.complete);
        assert_eq!(negated.signal, CompletionSignal::Default);

        assert!(!parse_completion("There is insufficient information.").complete);
    }

    #[test]
    fn test_parse_completion_ignores_echoed_placeholder() {
        let echoed = parse_completion(
            "Research complete: [Yes/No]\nReasoning: pricing still unclear\nMissing information:\n1. Pricing tiers",
        );
        assert_eq!(echoed, Completion { complete: false, signal: CompletionSignal::Default });

        let answered_later = parse_completion("Research complete: [Yes/No]\nResearch complete: Yes");
        assert_eq!(answered_later, Completion { complete: true, signal: CompletionSignal::ExplicitTag });

        let bracketed = parse_completion("Research complete: [No]");
        assert_eq!(bracketed, Completion { complete: false, signal: CompletionSignal::ExplicitTag });
    }

    #[test]
    fn test_parse_tool_selection_json() {
        let text = "Tool: search_and_read\nParameters: {\n  \"query\": \"tokio {runtime}\",\n  \"num_results\": 3\n}\n";
        let invocation = parse_tool_selection(text).unwrap();
        assert_eq!(invocation.tool_name, "search_and_read");
        assert_eq!(Value::Object(invocation.parameters), json!({"query": "tokio {runtime}", "num_results": 3}));
    }

    #[test]
    fn test_parse_tool_selection_broken_json() {
        let text = "**Tool:** Web-Search\nParameters: {\"query\": \"rust gui crates\", \"max_results\": 4,}";
        let invocation = parse_tool_selection(text).unwrap();
        assert_eq!(invocation.tool_name, "web_search");
        assert_eq!(invocation.parameters["query"], "rust gui crates");
        assert_eq!(invocation.parameters["max_results"], 4);
    }

    #[test]
    fn test_parse_tool_selection_loose_pairs() {
        let text = "Tool: fetch_webpage\nurl: https://tokio.rs/blog\nreason: official source";
        let invocation = parse_tool_selection(text).unwrap();
        assert_eq!(invocation.parameters["url"], "https://tokio.rs/blog");
        assert!(!invocation.parameters.contains_key("tool"));
    }

    #[test]
    fn test_parse_tool_selection_without_tool() {
        assert_eq!(parse_tool_selection("I would search the web."), Err(NoMatch));
    }
}
