//! Query analysis for the web research engine: intent classification, key
//! term extraction, follow-up generation and relevance ranking

use super::types::SearchResult;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static LIST_INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:list|top|best|examples|ways to|things|items|reasons|methods|techniques|tips|ideas|options|alternatives|types)\b",
    )
    .expect("valid list indicator regex")
});
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid number regex"));
static HOW_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhow\b.*\bto\b").expect("valid how-to regex"));
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:versus|vs\.?|compare\w*|difference\w*)(?:\W|$)")
        .expect("valid comparison regex")
});
static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:what is|definition|meaning|explain)\b").expect("valid definition regex")
});
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));
static PROPER_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-zA-Z]{3,}\b").expect("valid proper noun regex"));
static TITLE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\s+").expect("valid title number regex"));
static LIST_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:list of|top|best|most popular)\b").expect("valid qualifier regex")
});

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "where", "when", "how", "who", "why",
    "which", "about", "from", "your", "have", "more", "will", "they", "them", "their", "there",
    "into", "than", "then", "also", "been", "were",
];

/// Words in result titles that signal list-style pages
const LIST_TITLE_WORDS: &[&str] = &["list", "top", "best", "comprehensive"];

const ENTITY_TYPES: &[&str] = &[
    "people",
    "places",
    "products",
    "companies",
    "examples",
    "guides",
    "articles",
    "resources",
    "reviews",
];

/// Heuristic classification of what a query asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryIntent {
    pub list: bool,
    pub how_to: bool,
    pub comparison: bool,
    pub definition: bool,
}

impl QueryIntent {
    pub fn classify(query: &str) -> Self {
        Self {
            list: needs_list_content(query),
            how_to: HOW_TO.is_match(query),
            comparison: COMPARISON.is_match(query),
            definition: DEFINITION.is_match(query),
        }
    }
}

/// Whether a query asks for a list of items (list wording or a bare number)
pub fn needs_list_content(query: &str) -> bool {
    LIST_INDICATOR.is_match(query) || BARE_NUMBER.is_match(query)
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn result_text(result: &SearchResult) -> String {
    format!("{} {}", result.title, result.snippet)
}

/// Key terms of a result set, most significant first.
///
/// Terms repeated across titles and snippets come first (by frequency, then
/// first appearance), then capitalised words, then the query's own long
/// words. Everything is lowercased and deduplicated.
pub fn extract_key_terms(results: &[SearchResult], query: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0;
    for result in results {
        let text = result_text(result).to_lowercase();
        for word in WORD.find_iter(&text).map(|m| m.as_str()) {
            if word.chars().count() < 4 || is_stopword(word) {
                continue;
            }
            let entry = counts.entry(word.to_string()).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut frequent: Vec<(String, usize, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= 2)
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    let mut push = |term: String| {
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    };

    for (term, _, _) in frequent {
        push(term);
    }
    for result in results {
        let text = result_text(result);
        for proper in PROPER_NOUN.find_iter(&text) {
            push(proper.as_str().to_lowercase());
        }
    }
    for word in WORD.find_iter(&query.to_lowercase()) {
        if word.as_str().chars().count() >= 4 && !is_stopword(word.as_str()) {
            push(word.as_str().to_string());
        }
    }

    terms
}

/// Entity kinds the results talk about most, at most three
fn entity_types(results: &[SearchResult]) -> Vec<&'static str> {
    let texts: Vec<String> = results
        .iter()
        .map(|r| result_text(r).to_lowercase())
        .collect();

    let mut counted: Vec<(&'static str, usize)> = ENTITY_TYPES
        .iter()
        .map(|&entity| {
            let singular = entity.strip_suffix('s').unwrap_or(entity);
            let count = texts.iter().filter(|t| t.contains(singular)).count();
            (entity, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1));
    counted.into_iter().take(3).map(|(entity, _)| entity).collect()
}

fn is_year(number: u64) -> bool {
    (1900..=2099).contains(&number)
}

/// Variants of the query with a large explicit count replaced by smaller ones
fn downscaled_counts(query: &str) -> Vec<String> {
    let Some(found) = BARE_NUMBER.find_iter(query).find(|m| {
        m.as_str()
            .parse::<u64>()
            .map(|n| !is_year(n))
            .unwrap_or(false)
    }) else {
        return Vec::new();
    };
    let Ok(number) = found.as_str().parse::<u64>() else {
        return Vec::new();
    };

    [50u64, 20, 10]
        .into_iter()
        .filter(|&smaller| number > smaller)
        .map(|smaller| {
            format!(
                "{}{}{}",
                &query[..found.start()],
                smaller,
                &query[found.end()..]
            )
        })
        .collect()
}

/// Follow-up queries in generation order, deduplicated, capped at `limit`
pub fn generate_follow_up_queries(
    query: &str,
    key_terms: &[String],
    results: &[SearchResult],
    limit: usize,
) -> Vec<String> {
    let intent = QueryIntent::classify(query);
    let query_lower = query.to_lowercase();
    let fresh_terms: Vec<&str> = key_terms
        .iter()
        .map(String::as_str)
        .filter(|term| !query_lower.contains(term))
        .take(7)
        .collect();

    let mut candidates = Vec::new();
    for width in [3, 2, 1] {
        if fresh_terms.len() >= width {
            candidates.push(format!("{} {}", query, fresh_terms[..width].join(" ")));
        }
    }

    if intent.list {
        for suffix in ["list", "comprehensive", "examples", "directory"] {
            candidates.push(format!("{} {}", query, suffix));
        }
        candidates.extend(downscaled_counts(query));
    }
    if intent.how_to {
        for suffix in ["tutorial", "guide", "steps"] {
            candidates.push(format!("{} {}", query, suffix));
        }
    }
    if intent.comparison {
        for suffix in ["comparison", "differences", "similarities"] {
            candidates.push(format!("{} {}", query, suffix));
        }
    }
    if intent.definition {
        for suffix in ["definition", "meaning", "examples"] {
            candidates.push(format!("{} {}", query, suffix));
        }
    }
    for entity in entity_types(results) {
        candidates.push(format!("{} {}", query, entity));
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| candidate != query && seen.insert(candidate.clone()))
        .take(limit)
        .collect()
}

fn relevance_score(result: &SearchResult, query_terms: &[String], key_terms: &[String], list: bool) -> u32 {
    let title = result.title.to_lowercase();
    let snippet = result.snippet.to_lowercase();
    let url = result.url.to_lowercase();

    let mut score = 0;
    for term in query_terms {
        if title.contains(term.as_str()) {
            score += 5;
        }
        if snippet.contains(term.as_str()) {
            score += 2;
        }
        if url.contains(term.as_str()) {
            score += 1;
        }
    }
    for term in key_terms {
        if title.contains(term.as_str()) {
            score += 3;
        }
        if snippet.contains(term.as_str()) {
            score += 1;
        }
    }
    if list {
        if LIST_TITLE_WORDS.iter().any(|word| title.contains(word)) {
            score += 8;
        }
        if TITLE_NUMBER.is_match(&title) {
            score += 5;
        }
    }
    score
}

/// Sort results by descending relevance; equal scores keep their order
pub fn sort_by_relevance(
    results: Vec<SearchResult>,
    query: &str,
    key_terms: &[String],
) -> Vec<SearchResult> {
    let list = needs_list_content(query);
    let query_lower = query.to_lowercase();
    let mut query_terms: Vec<String> = Vec::new();
    for word in WORD.find_iter(&query_lower) {
        if !query_terms.iter().any(|t| t == word.as_str()) {
            query_terms.push(word.as_str().to_string());
        }
    }

    let mut scored: Vec<(u32, SearchResult)> = results
        .into_iter()
        .map(|result| (relevance_score(&result, &query_terms, key_terms, list), result))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, result)| result).collect()
}

/// Broader variant of a query: counts and list qualifiers removed
pub fn generalize_query(query: &str) -> String {
    let without_numbers = BARE_NUMBER.replace_all(query, "");
    let without_qualifiers = LIST_QUALIFIER.replace_all(&without_numbers, "");
    let core = without_qualifiers.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("about {}", core)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, snippet: &str, url: &str) -> SearchResult {
        SearchResult::new(title, snippet, url)
    }

    #[test]
    fn test_list_intent_with_small_count() {
        let query = "best 5 programming languages for 2024";
        let intent = QueryIntent::classify(query);
        assert!(intent.list);
        assert!(!intent.comparison);

        let follow_ups = generate_follow_up_queries(query, &[], &[], 20);
        assert!(follow_ups.contains(&format!("{} list", query)));
        assert!(follow_ups.iter().all(|q| !q.contains("best 50") && !q.contains("best 20") && !q.contains("best 10")));
        assert!(follow_ups.iter().all(|q| q.contains("2024")));
    }

    #[test]
    fn test_large_counts_are_downscaled() {
        let follow_ups = generate_follow_up_queries("top 100 rust crates", &[], &[], 20);
        assert!(follow_ups.contains(&"top 50 rust crates".to_string()));
        assert!(follow_ups.contains(&"top 20 rust crates".to_string()));
        assert!(follow_ups.contains(&"top 10 rust crates".to_string()));
    }

    #[test]
    fn test_follow_ups_are_distinct_and_ordered() {
        let results = vec![
            result("Rust async guide", "Tokio runtime examples and articles", "https://a.com"),
            result("Tokio tutorial", "async runtime for Rust examples", "https://b.com"),
        ];
        let terms = extract_key_terms(&results, "what is async rust");
        let follow_ups = generate_follow_up_queries("what is async rust", &terms, &results, 50);

        let unique: HashSet<&String> = follow_ups.iter().collect();
        assert_eq!(unique.len(), follow_ups.len());

        let definition = follow_ups.iter().position(|q| q.ends_with(" definition")).unwrap();
        let meaning = follow_ups.iter().position(|q| q.ends_with(" meaning")).unwrap();
        assert!(definition < meaning);
        assert!(follow_ups[0].starts_with("what is async rust "));
    }

    #[test]
    fn test_follow_up_limit() {
        let follow_ups = generate_follow_up_queries("how to compare 30 options", &[], &[], 7);
        assert_eq!(follow_ups.len(), 7);
    }

    #[test]
    fn test_extract_key_terms_ordering() {
        let results = vec![
            result("Tokio runtime", "runtime scheduling tasks", ""),
            result("Runtime internals", "tasks and wakers", ""),
        ];
        let terms = extract_key_terms(&results, "async executors");
        assert_eq!(terms[0], "runtime");
        assert_eq!(terms[1], "tasks");
        assert!(terms.contains(&"tokio".to_string()));
        assert!(terms.contains(&"executors".to_string()));
    }

    #[test]
    fn test_sort_by_relevance_is_stable() {
        let results = vec![
            result("Unrelated", "", "https://x.com"),
            result("Top 10 Rust web frameworks", "rust frameworks", "https://y.com/rust"),
            result("Also unrelated", "", "https://z.com"),
        ];
        let sorted = sort_by_relevance(results, "best rust frameworks", &[]);
        assert_eq!(sorted[0].url, "https://y.com/rust");
        assert_eq!(sorted[1].url, "https://x.com");
        assert_eq!(sorted[2].url, "https://z.com");
    }

    #[test]
    fn test_generalize_query() {
        assert_eq!(generalize_query("top 25 list of sci-fi novels"), "about sci-fi novels");
        assert_eq!(generalize_query("best laptops"), "about laptops");
        assert_eq!(generalize_query("stop motion"), "about stop motion");
    }
}
