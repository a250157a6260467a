//! Multi-round web research
//!
//! A primary search is widened by follow-up queries, the pooled results are
//! ranked and the best pages are fetched with a domain diversity rule. List
//! queries that come up short get a second, list-focused pass and thin
//! results of any kind get a generalized pass.

use super::client::WebClient;
use super::extract::{clip_chars, contains_list, domain_of, truncate_chars};
use super::query::{
    extract_key_terms, generalize_query, generate_follow_up_queries, needs_list_content,
    sort_by_relevance,
};
use super::types::{ContentItem, SearchResult, WebResearchReport};
use delve_core::WebConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum content items before the generalized pass is skipped
const MIN_CONTENT_ITEMS: usize = 3;
const LIST_PASS_RESULTS: usize = 8;
const GENERAL_PASS_RESULTS: usize = 5;

pub struct WebResearcher {
    client: Arc<dyn WebClient>,
    config: WebConfig,
}

/// Mutable bookkeeping of one research call
struct FetchState {
    content: Vec<ContentItem>,
    fetched_urls: HashSet<String>,
    domains: HashSet<String>,
    fetches: usize,
}

impl FetchState {
    fn new() -> Self {
        Self {
            content: Vec::new(),
            fetched_urls: HashSet::new(),
            domains: HashSet::new(),
            fetches: 0,
        }
    }

    /// A domain already represented is skipped once `max_domains` distinct
    /// domains have been collected
    fn domain_saturated(&self, domain: &str, max_domains: usize) -> bool {
        self.domains.contains(domain) && self.domains.len() >= max_domains
    }

    fn push(&mut self, result: &SearchResult, domain: String, content: String) {
        self.domains.insert(domain);
        self.fetched_urls.insert(result.url.clone());
        self.content.push(ContentItem {
            title: result.title.clone(),
            url: result.url.clone(),
            content,
        });
    }
}

impl WebResearcher {
    pub fn new(client: Arc<dyn WebClient>, config: WebConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<dyn WebClient> {
        &self.client
    }

    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Search with network failures treated as zero results
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        match self.client.search(query, max_results).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query, error = %e, "Search failed, continuing without results");
                Vec::new()
            }
        }
    }

    /// Fetch with the politeness delay between consecutive fetches; failures
    /// and empty pages yield `None`
    async fn fetch(&self, state: &mut FetchState, url: &str) -> Option<String> {
        if state.fetches > 0 && self.config.politeness_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.politeness_delay_ms)).await;
        }
        state.fetches += 1;

        match self.client.fetch_content(url).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                debug!(url, "Fetched page has no text");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "Fetch failed, skipping page");
                None
            }
        }
    }

    /// Run the full research algorithm; never fails, worst case is an empty report
    pub async fn research(&self, query: &str) -> WebResearchReport {
        info!(query, "Starting web research");
        let config = &self.config;

        let primary = self.search(query, config.primary_results).await;
        let mut seen_urls: HashSet<String> = primary
            .iter()
            .filter(|r| !r.url.is_empty())
            .map(|r| r.url.clone())
            .collect();

        let key_terms = extract_key_terms(&primary, query);
        let follow_ups =
            generate_follow_up_queries(query, &key_terms, &primary, config.followup_limit);
        debug!(count = follow_ups.len(), ?follow_ups, "Generated follow-up queries");

        let mut pool = primary;
        for follow_up in &follow_ups {
            let results = self.search(follow_up, config.followup_results).await;
            let before = pool.len();
            for result in results {
                if !result.url.is_empty() && seen_urls.insert(result.url.clone()) {
                    pool.push(result);
                }
            }
            debug!(query = %follow_up, new = pool.len() - before, "Follow-up search done");
        }

        let ranked = sort_by_relevance(pool, query, &key_terms);
        let mut state = FetchState::new();

        for result in ranked.iter().take(config.content_candidates) {
            if result.url.is_empty() || state.fetched_urls.contains(&result.url) {
                continue;
            }
            let domain = domain_of(&result.url).unwrap_or_else(|| result.url.clone());
            if state.domain_saturated(&domain, config.max_domains) {
                continue;
            }
            if let Some(text) = self.fetch(&mut state, &result.url).await {
                state.push(result, domain, clip_chars(&text, config.content_chars).to_string());
                if state.content.len() >= config.max_content_items {
                    break;
                }
            }
        }
        info!(items = state.content.len(), "Primary content pass done");

        let mut search_results = ranked;

        if needs_list_content(query) && state.content.len() < config.list_threshold {
            let list_query = format!("{} list comprehensive", query);
            for result in self.search(&list_query, LIST_PASS_RESULTS).await {
                if state.content.len() >= config.list_target {
                    break;
                }
                if result.url.is_empty() || !seen_urls.insert(result.url.clone()) {
                    continue;
                }
                let domain = domain_of(&result.url).unwrap_or_else(|| result.url.clone());
                if state.domain_saturated(&domain, config.list_max_domains) {
                    continue;
                }
                if let Some(text) = self.fetch(&mut state, &result.url).await {
                    if contains_list(&text) {
                        state.push(&result, domain, clip_chars(&text, config.list_content_chars).to_string());
                    }
                }
                search_results.push(result);
            }
            info!(items = state.content.len(), "List content pass done");
        }

        if state.content.len() < MIN_CONTENT_ITEMS {
            let general_query = generalize_query(query);
            for result in self.search(&general_query, GENERAL_PASS_RESULTS).await {
                if state.content.len() >= config.list_target {
                    break;
                }
                if result.url.is_empty() || !seen_urls.insert(result.url.clone()) {
                    continue;
                }
                let domain = domain_of(&result.url).unwrap_or_else(|| result.url.clone());
                if let Some(text) = self.fetch(&mut state, &result.url).await {
                    state.push(&result, domain, clip_chars(&text, config.content_chars).to_string());
                }
                search_results.push(result);
            }
            info!(query = %general_query, items = state.content.len(), "General content pass done");
        }

        info!(
            results = search_results.len(),
            content = state.content.len(),
            "Web research complete"
        );

        WebResearchReport {
            query: query.to_string(),
            search_results,
            content: state.content,
            timestamp: chrono::Utc::now(),
        }
    }
}

const PROMPT_RESULT_LIMIT: usize = 20;
const PROMPT_CONTENT_LIMIT: usize = 20;
const LIST_EXCERPT_CHARS: usize = 3000;
const EXCERPT_CHARS: usize = 1500;

/// Render a research report as an LLM prompt section with `[SOURCE i]` labels
pub fn format_research_for_prompt(report: &WebResearchReport) -> String {
    let mut parts = vec![
        "WEB RESEARCH RESULTS".to_string(),
        format!("Query: '{}'", report.query),
        "\n===== SEARCH RESULTS =====\n".to_string(),
    ];

    for (i, result) in report.search_results.iter().take(PROMPT_RESULT_LIMIT).enumerate() {
        parts.push(format!(
            "[{}] {}\nURL: {}\nSnippet: {}\n",
            i + 1,
            if result.title.is_empty() { "No title" } else { &result.title },
            result.url,
            if result.snippet.is_empty() { "No snippet" } else { &result.snippet },
        ));
    }

    parts.push("\n===== WEBPAGE CONTENT =====\n".to_string());

    for (i, item) in report.content.iter().take(PROMPT_CONTENT_LIMIT).enumerate() {
        let limit = if contains_list(&item.content) {
            LIST_EXCERPT_CHARS
        } else {
            EXCERPT_CHARS
        };
        parts.push(format!(
            "[SOURCE {}] {}\nURL: {}\n\n{}\n",
            i + 1,
            if item.title.is_empty() { "No title" } else { &item.title },
            item.url,
            truncate_chars(&item.content, limit),
        ));
    }

    parts.push(
        "\n===== INSTRUCTIONS =====\nWhen using the information above, please cite the sources by referencing the [SOURCE X] numbers."
            .to_string(),
    );
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_research_for_prompt() {
        let report = WebResearchReport {
            query: "rust".to_string(),
            search_results: vec![SearchResult::new("Rust", "", "https://rust-lang.org")],
            content: vec![
                ContentItem {
                    title: "Plain".to_string(),
                    url: "https://a.com".to_string(),
                    content: "x".repeat(2000),
                },
                ContentItem {
                    title: String::new(),
                    url: "https://b.com".to_string(),
                    content: format!("The following crates: {}", "y".repeat(4000)),
                },
            ],
            timestamp: chrono::Utc::now(),
        };

        let prompt = format_research_for_prompt(&report);
        assert!(prompt.contains("[1] Rust\nURL: https://rust-lang.org\nSnippet: No snippet"));
        assert!(prompt.contains(&format!("[SOURCE 1] Plain\nURL: https://a.com\n\n{}...", "x".repeat(1500))));
        assert!(prompt.contains("[SOURCE 2] No title"));
        assert!(!prompt.contains(&"y".repeat(3000)));
        assert!(prompt.contains(&"y".repeat(2900)));
    }
}
