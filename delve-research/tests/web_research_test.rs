//! Integration tests for the multi-round web research engine

use async_trait::async_trait;
use delve_core::{network_error, DelveResult, WebConfig};
use delve_research::{SearchResult, WebClient, WebResearcher};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Web collaborator answering from fixed tables
#[derive(Default)]
struct ScriptedWeb {
    searches: HashMap<String, Vec<SearchResult>>,
    /// Answer for queries without an entry
    fallback_results: Vec<SearchResult>,
    pages: HashMap<String, String>,
    search_down: bool,
    searched: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedWeb {
    fn search_for(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.searches.insert(query.to_string(), results);
        self
    }

    fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl WebClient for ScriptedWeb {
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
        self.searched.lock().unwrap().push(query.to_string());
        if self.search_down {
            return Err(network_error!("search endpoint unreachable", "scripted_web"));
        }
        let results = self
            .searches
            .get(query)
            .unwrap_or(&self.fallback_results)
            .iter()
            .take(max_results)
            .cloned()
            .collect();
        Ok(results)
    }

    async fn fetch_content(&self, url: &str) -> DelveResult<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| network_error!(format!("HTTP 404 for {}", url), "scripted_web"))
    }
}

fn result(title: &str, url: &str) -> SearchResult {
    SearchResult::new(title, format!("Snippet for {}", title), url)
}

fn config() -> WebConfig {
    WebConfig {
        politeness_delay_ms: 0,
        ..WebConfig::default()
    }
}

fn researcher(web: Arc<ScriptedWeb>, config: WebConfig) -> WebResearcher {
    WebResearcher::new(web, config)
}

#[tokio::test]
async fn test_content_urls_are_unique_across_rounds() {
    let web = Arc::new(
        ScriptedWeb {
            fallback_results: vec![
                result("Tokio", "https://a.com/1"),
                result("Tokio internals", "https://b.com/2"),
                result("Tokio again", "https://a.com/1"),
                result("Scheduler", "https://c.com/3"),
            ],
            ..Default::default()
        }
        .page("https://a.com/1", "Tokio is an async runtime.")
        .page("https://b.com/2", "The scheduler uses work stealing.")
        .page("https://c.com/3", "Tasks are cooperative."),
    );

    let report = researcher(web.clone(), config())
        .research("tokio runtime scheduler")
        .await;

    let urls: Vec<&str> = report.content.iter().map(|c| c.url.as_str()).collect();
    let unique: HashSet<&str> = urls.iter().copied().collect();
    assert_eq!(urls.len(), 3);
    assert_eq!(unique.len(), urls.len());

    let fetched = web.fetched.lock().unwrap();
    let unique_fetches: HashSet<&String> = fetched.iter().collect();
    assert_eq!(unique_fetches.len(), fetched.len());
}

#[tokio::test]
async fn test_list_pass_requires_list_signature() {
    let query = "best 5 rust web frameworks";
    let web = Arc::new(
        ScriptedWeb::default()
            .search_for(
                query,
                vec![result("Axum", "https://x.com/a"), result("Actix", "https://y.com/b")],
            )
            .search_for(
                "best 5 rust web frameworks list comprehensive",
                vec![
                    result("Framework roundup", "https://l1.com/list"),
                    result("Essay", "https://l2.com/prose"),
                    result("Axum", "https://x.com/a"),
                ],
            )
            .page("https://x.com/a", "Axum is a web framework built on hyper.")
            .page("https://y.com/b", "Actix web is fast.")
            .page("https://l1.com/list", "1. Axum\n2. Actix web\n3. Rocket")
            .page("https://l2.com/prose", "Plain prose about frameworks."),
    );

    let report = researcher(web.clone(), config()).research(query).await;

    let urls: Vec<&str> = report.content.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["https://x.com/a", "https://y.com/b", "https://l1.com/list"]);
    assert_eq!(report.search_results.len(), 4);
    assert!(web
        .searched
        .lock()
        .unwrap()
        .iter()
        .any(|q| q == "best 5 rust web frameworks list comprehensive"));
}

#[tokio::test]
async fn test_list_content_is_cut_to_exact_limit() {
    let query = "top 3 rust parsers";
    let web = Arc::new(
        ScriptedWeb::default()
            .search_for(
                "top 3 rust parsers list comprehensive",
                vec![result("Parser roundup", "https://l1.com/list")],
            )
            .page("https://l1.com/list", "1. nom\n2. pest\n3. winnow\n4. chumsky"),
    );

    let report = researcher(
        web,
        WebConfig {
            list_content_chars: 10,
            ..config()
        },
    )
    .research(query)
    .await;

    assert_eq!(report.content.len(), 1);
    assert_eq!(report.content[0].content, "1. nom\n2. ");
}

#[tokio::test]
async fn test_general_pass_runs_when_content_is_thin() {
    let web = Arc::new(
        ScriptedWeb::default()
            .search_for("obscure crate zyx", vec![result("Dead link", "https://p.com/1")])
            .search_for(
                "about obscure crate zyx",
                vec![result("Crates", "https://g1.com/a"), result("Registry", "https://g2.com/b")],
            )
            .page("https://g1.com/a", "Crates are published to crates.io.")
            .page("https://g2.com/b", "The registry indexes crates."),
    );

    let report = researcher(web, config()).research("obscure crate zyx").await;

    let urls: Vec<&str> = report.content.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["https://g1.com/a", "https://g2.com/b"]);
}

#[tokio::test]
async fn test_network_failures_yield_empty_report() {
    let web = Arc::new(ScriptedWeb {
        search_down: true,
        ..Default::default()
    });

    let report = researcher(web.clone(), config()).research("anything at all").await;

    assert_eq!(report.query, "anything at all");
    assert!(report.search_results.is_empty());
    assert!(report.content.is_empty());
    assert!(web.fetched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_domain_diversity_limit() {
    let web = Arc::new(
        ScriptedWeb {
            fallback_results: vec![
                result("one", "https://a.com/1"),
                result("two", "https://b.com/1"),
                result("three", "https://a.com/2"),
                result("four", "https://c.com/1"),
            ],
            ..Default::default()
        }
        .page("https://a.com/1", "one")
        .page("https://b.com/1", "two")
        .page("https://a.com/2", "three")
        .page("https://c.com/1", "four"),
    );

    let report = researcher(
        web,
        WebConfig {
            max_domains: 2,
            ..config()
        },
    )
    .research("diversity check")
    .await;

    let urls: Vec<&str> = report.content.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.com/1", "https://b.com/1", "https://c.com/1"]);
}

#[tokio::test]
async fn test_content_is_truncated_and_fetches_are_spaced() {
    let long_page = "word ".repeat(100);
    let web = Arc::new(
        ScriptedWeb {
            fallback_results: vec![
                result("First", "https://a.com/1"),
                result("Second", "https://b.com/1"),
                result("Third", "https://c.com/1"),
            ],
            ..Default::default()
        }
        .page("https://a.com/1", &long_page)
        .page("https://b.com/1", &long_page)
        .page("https://c.com/1", &long_page),
    );

    let started = Instant::now();
    let report = researcher(
        web,
        WebConfig {
            content_chars: 50,
            politeness_delay_ms: 30,
            ..config()
        },
    )
    .research("spacing check")
    .await;

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(report.content.len(), 3);
    assert!(report
        .content
        .iter()
        .all(|item| item.content.chars().count() == 50 && !item.content.ends_with("...")));
}
