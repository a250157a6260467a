//! Search and fetch collaborator
//!
//! [`WebClient`] is the seam between the research engine and the network.
//! [`DuckDuckGoClient`] is the default implementation: it scrapes the
//! DuckDuckGo HTML endpoint and falls back to the Instant Answer API.

use super::extract::{clip_chars, html_to_text, strip_tags};
use super::types::SearchResult;
use async_trait::async_trait;
use delve_core::{network_error, DelveError, DelveResult, ErrorContext, WebConfig};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const INSTANT_ANSWER_ENDPOINT: &str = "https://api.duckduckgo.com/";

static ANCHORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\s([^>]*)>(.*?)</a\s*>").expect("valid anchor regex"));
static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*"([^"]*)""#).expect("valid href regex"));

#[async_trait]
pub trait WebClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>>;

    /// Visible text of the page, already stripped of markup
    async fn fetch_content(&self, url: &str) -> DelveResult<String>;
}

pub struct DuckDuckGoClient {
    http: reqwest::Client,
    fetch_max_chars: usize,
}

impl DuckDuckGoClient {
    pub fn new(config: &WebConfig) -> DelveResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| network_error!("Failed to build HTTP client", "web_client", e))?;

        Ok(Self {
            http,
            fetch_max_chars: config.fetch_max_chars,
        })
    }

    async fn get_text(&self, request: reqwest::RequestBuilder, what: &str) -> DelveResult<String> {
        let response = request.send().await.map_err(|e| DelveError::Network {
            message: format!("{} request failed: {}", what, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("web_client").with_operation(what),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DelveError::Network {
                message: format!("{} returned HTTP {}", what, status),
                source: None,
                context: ErrorContext::new("web_client")
                    .with_operation(what)
                    .with_metadata("status", status.as_str()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| network_error!(format!("Failed to read {} body", what), "web_client", e))
    }

    async fn search_html(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
        let request = self.http.post(HTML_ENDPOINT).form(&[("q", query)]);
        let html = self.get_text(request, "search").await?;
        Ok(parse_html_results(&html, max_results))
    }

    async fn search_instant_answer(
        &self,
        query: &str,
        max_results: usize,
    ) -> DelveResult<Vec<SearchResult>> {
        let request = self.http.get(INSTANT_ANSWER_ENDPOINT).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let body = self.get_text(request, "instant_answer").await?;
        let json: Value = serde_json::from_str(&body)?;
        Ok(parse_instant_answer(&json, max_results))
    }
}

#[async_trait]
impl WebClient for DuckDuckGoClient {
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
        match self.search_html(query, max_results).await {
            Ok(results) if !results.is_empty() => {
                debug!(query, count = results.len(), "HTML search succeeded");
                return Ok(results);
            }
            Ok(_) => debug!(query, "HTML search returned nothing, trying instant answers"),
            Err(e) => warn!(query, error = %e, "HTML search failed, trying instant answers"),
        }
        self.search_instant_answer(query, max_results).await
    }

    async fn fetch_content(&self, url: &str) -> DelveResult<String> {
        let html = self.get_text(self.http.get(url), "fetch").await?;
        let text = html_to_text(&html);
        debug!(url, chars = text.len(), "Fetched page");
        Ok(clip_chars(&text, self.fetch_max_chars).to_string())
    }
}

/// Resolve DuckDuckGo redirect links (`/l/?uddg=<encoded target>`)
fn resolve_result_url(href: &str) -> Option<String> {
    let href = href.replace("&amp;", "&");
    if let Some(start) = href.find("uddg=") {
        let encoded = href[start + 5..].split('&').next().unwrap_or_default();
        return urlencoding::decode(encoded).ok().map(|url| url.into_owned());
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    href.starts_with("http").then_some(href)
}

/// Parse result anchors and snippets from the HTML endpoint
pub fn parse_html_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::new();

    for caps in ANCHORS.captures_iter(html) {
        let attributes = &caps[1];
        if attributes.contains("result__a") {
            if results.len() >= max_results {
                break;
            }
            let Some(url) = HREF
                .captures(attributes)
                .and_then(|href| resolve_result_url(&href[1]))
            else {
                continue;
            };
            // Sponsored results point back at duckduckgo itself
            if url.contains("duckduckgo.com/y.js") {
                continue;
            }
            results.push(SearchResult::new(strip_tags(&caps[2]), "", url));
        } else if attributes.contains("result__snippet") {
            if let Some(last) = results.last_mut().filter(|r| r.snippet.is_empty()) {
                last.snippet = strip_tags(&caps[2]);
            }
        }
    }

    results
}

fn title_from_url(url: &str) -> String {
    let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    decoded.replace('_', " ")
}

fn push_topic(topic: &Value, results: &mut Vec<SearchResult>) {
    let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or_default();
    let text = topic.get("Text").and_then(Value::as_str).unwrap_or_default();
    if !url.is_empty() && !text.is_empty() {
        results.push(SearchResult::new(title_from_url(url), text, url));
    }
}

/// Convert an Instant Answer response into search results
pub fn parse_instant_answer(json: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = json
        .get("AbstractText")
        .or_else(|| json.get("Abstract"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let abstract_url = json.get("AbstractURL").and_then(Value::as_str).unwrap_or_default();
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = json.get("Heading").and_then(Value::as_str).unwrap_or_default();
        results.push(SearchResult::new(heading, abstract_text, abstract_url));
    }

    if let Some(topics) = json.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics {
            match topic.get("Topics").and_then(Value::as_array) {
                Some(nested) => nested.iter().for_each(|t| push_topic(t, &mut results)),
                None => push_topic(topic, &mut results),
            }
        }
    }

    results.truncate(max_results);
    results
}
