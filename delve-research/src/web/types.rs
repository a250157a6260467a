//! Data carried through a web research run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One search hit; identified by its url when present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// Length-bounded visible text of a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResearchReport {
    pub query: String,
    /// Ranked, best first
    pub search_results: Vec<SearchResult>,
    /// In collection order, no url twice
    pub content: Vec<ContentItem>,
    pub timestamp: DateTime<Utc>,
}

impl WebResearchReport {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            search_results: Vec::new(),
            content: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
