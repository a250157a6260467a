//! Tools for finding and aggregating lists of items

use super::registry::{ParamSpec, Tool, ToolOutput, ToolParams, ToolSchema};
use super::{param_str, param_usize, require_str, timestamp, to_output};
use crate::web::{SearchResult, WebClient};
use crate::{ResearchError, ResearchResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RESULTS_PER_QUERY: usize = 3;
const FALLBACK_RESULTS: usize = 5;
const DEFAULT_ITEM_TYPE: &str = "examples";
const DEFAULT_TARGET_COUNT: usize = 100;

/// Markers that suggest a page presents a list
const LIST_MARKERS: &[&str] = &["1.", "2.", "•", "- ", "Top", "Best"];
const CRITICAL_FIELDS: &[&str] = &["title", "description", "url"];
const EXTRA_FIELDS: &[&str] = &["channel", "duration", "platform"];

/// Searches for list-style pages about a topic and returns the first one found
pub struct FindListTool {
    client: Arc<dyn WebClient>,
    politeness_delay_ms: u64,
}

impl FindListTool {
    pub fn new(client: Arc<dyn WebClient>, politeness_delay_ms: u64) -> Self {
        Self {
            client,
            politeness_delay_ms,
        }
    }
}

#[async_trait]
impl Tool for FindListTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let topic = require_str(&params, "find_list", "topic")?;
        let item_type =
            param_str(&params, "item_type").unwrap_or_else(|| DEFAULT_ITEM_TYPE.to_string());

        let queries = [
            format!("list of {} {}", item_type, topic),
            format!("top {} {}", item_type, topic),
            format!("{} {} list", topic, item_type),
        ];

        let mut collected: Vec<SearchResult> = Vec::new();
        let mut fetched = false;
        for query in &queries {
            let results = match self.client.search(query, RESULTS_PER_QUERY).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %query, error = %e, "List search failed");
                    continue;
                }
            };
            let Some(top) = results.first().cloned() else {
                continue;
            };
            collected.extend(results);
            if top.url.is_empty() {
                continue;
            }

            if fetched && self.politeness_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.politeness_delay_ms)).await;
            }
            fetched = true;

            match self.client.fetch_content(&top.url).await {
                Ok(content) if LIST_MARKERS.iter().any(|m| content.contains(m)) => {
                    return Ok(to_output(json!({
                        "topic": topic,
                        "url": top.url,
                        "title": top.title,
                        "content": content,
                        "timestamp": timestamp(),
                    })));
                }
                Ok(_) => debug!(url = %top.url, "Page has no list markers"),
                Err(e) => warn!(url = %top.url, error = %e, "List page fetch failed"),
            }
        }

        if collected.is_empty() {
            return Ok(to_output(json!({
                "topic": topic,
                "error": "No relevant list information found",
                "timestamp": timestamp(),
            })));
        }

        collected.truncate(FALLBACK_RESULTS);
        Ok(to_output(json!({
            "topic": topic,
            "results": collected,
            "message": "No specific list found, but here are relevant results",
            "timestamp": timestamp(),
        })))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ParamSpec::new("topic").with_aliases(&["query", "subject", "q"]),
            ParamSpec::new("item_type").with_aliases(&["type", "kind", "category"]),
        ])
        .with_query("topic")
    }
}

/// Deduplicates items gathered from several sources and ranks them by completeness
pub struct AggregateListTool;

fn non_empty(item: &Map<String, Value>, field: &str) -> bool {
    match item.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(_)) => true,
    }
}

fn description_len(item: &Map<String, Value>) -> Option<usize> {
    item.get("description")
        .and_then(Value::as_str)
        .map(|d| d.chars().count())
}

fn critical_count(item: &Map<String, Value>) -> usize {
    CRITICAL_FIELDS.iter().filter(|f| non_empty(item, f)).count()
}

/// Whether `candidate` is a more complete version of `existing`
fn is_better_item(candidate: &Map<String, Value>, existing: &Map<String, Value>) -> bool {
    if candidate.len() > existing.len() || critical_count(candidate) > critical_count(existing) {
        return true;
    }
    matches!(
        (description_len(candidate), description_len(existing)),
        (Some(new), Some(old)) if new > old
    )
}

pub(crate) fn item_score(item: &Map<String, Value>) -> f64 {
    let mut score = critical_count(item) as f64;
    if let Some(len) = description_len(item).filter(|len| *len > 0) {
        score += (len as f64 / 200.0).min(1.0);
    }
    score += 0.2 * EXTRA_FIELDS.iter().filter(|f| non_empty(item, f)).count() as f64;
    score
}

fn dedup_key(item: &Map<String, Value>) -> String {
    let keyed = |field: &str| match item.get(field) {
        Some(Value::String(s)) => Some(format!("{}:{}", field, s)),
        Some(Value::Null) | None => None,
        Some(other) => Some(format!("{}:{}", field, other)),
    };
    keyed("url")
        .or_else(|| keyed("id"))
        .unwrap_or_else(|| format!("item:{}", Value::Object(item.clone())))
}

impl AggregateListTool {
    pub fn aggregate(items: Vec<Map<String, Value>>, target_count: usize) -> ToolOutput {
        let total = items.len();

        let mut order: Vec<String> = Vec::new();
        let mut unique: HashMap<String, Map<String, Value>> = HashMap::new();
        for item in items {
            let key = dedup_key(&item);
            match unique.get(&key) {
                Some(existing) if !is_better_item(&item, existing) => {}
                Some(_) => {
                    unique.insert(key, item);
                }
                None => {
                    order.push(key.clone());
                    unique.insert(key, item);
                }
            }
        }

        let unique_count = unique.len();
        let mut ranked: Vec<(f64, Map<String, Value>)> = order
            .into_iter()
            .filter_map(|key| unique.remove(&key))
            .map(|item| (item_score(&item), item))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let completeness = if target_count > 0 {
            unique_count as f64 / target_count as f64
        } else {
            1.0
        };
        let returned: Vec<Value> = ranked
            .into_iter()
            .take(target_count)
            .map(|(_, item)| Value::Object(item))
            .collect();

        to_output(json!({
            "stats": {
                "total_input_items": total,
                "unique_items": unique_count,
                "returned_items": returned.len(),
                "completeness": completeness,
            },
            "items": returned,
            "timestamp": timestamp(),
        }))
    }
}

#[async_trait]
impl Tool for AggregateListTool {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        let items = match params.get("items") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = Map::new();
                        map.insert("title".to_string(), other.clone());
                        map
                    }
                })
                .collect(),
            _ => return Err(ResearchError::invalid_parameter("aggregate_list", "items")),
        };
        let target_count = param_usize(&params, "target_count").unwrap_or(DEFAULT_TARGET_COUNT);
        Ok(Self::aggregate(items, target_count))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ParamSpec::new("items").with_aliases(&["list", "entries"]),
            ParamSpec::new("target_count").with_aliases(&["target", "count", "limit"]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::DelveResult;

    fn items(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_aggregate_dedups_and_keeps_richer_item() {
        let input = items(json!([
            {"url": "https://a.com", "title": "A"},
            {"url": "https://a.com", "title": "A", "description": "A longer description of A"},
            {"id": 7, "title": "Seven"},
            {"id": 7},
            {"title": "loose"},
            {"title": "loose"},
        ]));

        let output = AggregateListTool::aggregate(input, 10);
        let stats = &output["stats"];
        assert_eq!(stats["total_input_items"], 6);
        assert_eq!(stats["unique_items"], 3);
        assert_eq!(stats["returned_items"], 3);
        assert_eq!(stats["completeness"], 0.3);

        let returned = output["items"].as_array().unwrap();
        assert_eq!(returned[0]["description"], "A longer description of A");
        assert_eq!(returned[1]["title"], "Seven");
    }

    #[test]
    fn test_aggregate_truncates_to_target() {
        let input = items(json!([
            {"url": "https://a.com"},
            {"url": "https://b.com", "title": "B"},
            {"url": "https://c.com", "title": "C", "description": "see"},
        ]));
        let output = AggregateListTool::aggregate(input, 2);
        assert_eq!(output["stats"]["returned_items"], 2);
        assert_eq!(output["stats"]["completeness"], 1.5);
        assert_eq!(output["items"][0]["url"], "https://c.com");
        assert_eq!(output["items"][1]["url"], "https://b.com");
    }

    #[test]
    fn test_item_score() {
        let item = json!({"title": "t", "url": "u", "description": "x".repeat(100), "platform": "p"});
        let score = item_score(item.as_object().unwrap());
        assert!((score - 3.7).abs() < 1e-9);
    }

    struct ListClient;

    #[async_trait]
    impl WebClient for ListClient {
        async fn search(&self, query: &str, _max: usize) -> DelveResult<Vec<SearchResult>> {
            let slug = query.replace(' ', "-");
            Ok(vec![SearchResult::new(query, "", format!("https://lists.example/{}", slug))])
        }

        async fn fetch_content(&self, url: &str) -> DelveResult<String> {
            if url.starts_with("https://lists.example/top-") {
                Ok("1. Ferris\n2. Tux".to_string())
            } else {
                Ok("Plain prose without structure".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_find_list_returns_first_list_page() {
        let tool = FindListTool::new(Arc::new(ListClient), 0);
        let params = json!({"topic": "mascots"}).as_object().unwrap().clone();
        let output = tool.call(params).await.unwrap();
        assert_eq!(output["url"], "https://lists.example/top-examples-mascots");
        assert_eq!(output["content"], "1. Ferris\n2. Tux");
    }
}
