//! Name to capability lookup and invocation

use crate::{ResearchError, ResearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Named parameters of a tool call
pub type ToolParams = Map<String, Value>;
/// Result mapping returned verbatim by a tool
pub type ToolOutput = Map<String, Value>;

/// A declared parameter and the alternative names callers commonly use for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub aliases: Vec<String>,
}

impl ParamSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Parameter surface of a tool, used to repair LLM-chosen parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSchema {
    pub parameters: Vec<ParamSpec>,
    /// Parameter that carries the search text for search-like tools
    pub query_parameter: Option<String>,
}

impl ToolSchema {
    pub fn new(parameters: Vec<ParamSpec>) -> Self {
        Self {
            parameters,
            query_parameter: None,
        }
    }

    /// Mark `name` as the query parameter; the tool becomes search-like
    pub fn with_query(mut self, name: &str) -> Self {
        self.query_parameter = Some(name.to_string());
        self
    }

    /// Canonical parameter name for `name`, either itself or an alias target
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let lowered = name.to_lowercase();
        self.parameters
            .iter()
            .find(|spec| spec.name == lowered || spec.aliases.iter().any(|a| *a == lowered))
            .map(|spec| spec.name.as_str())
    }

    pub fn is_search_like(&self) -> bool {
        self.query_parameter.is_some()
    }
}

/// A capability the research loop can invoke.
///
/// Expected "nothing found" outcomes are returned as empty collections plus
/// an optional `error` field, never as `Err`.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput>;

    /// Parameters the tool accepts; an empty schema accepts anything
    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }
}

/// Name and description as presented to the LLM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

struct Registration {
    description: String,
    tool: Arc<dyn Tool>,
}

/// Wraps a synchronous closure as a [`Tool`]
struct FnTool<F> {
    func: F,
    schema: ToolSchema,
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(ToolParams) -> ResearchResult<ToolOutput> + Send + Sync,
{
    async fn call(&self, params: ToolParams) -> ResearchResult<ToolOutput> {
        (self.func)(params)
    }

    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }
}

/// Registry built once at startup and handed to the research loop
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; an existing binding with the same name is replaced
    pub fn register<T: Tool + 'static>(&mut self, name: &str, description: &str, tool: T) {
        self.register_arc(name, description, Arc::new(tool));
    }

    pub fn register_arc(&mut self, name: &str, description: &str, tool: Arc<dyn Tool>) {
        if self.tools.contains_key(name) {
            debug!(tool = name, "Replacing registered tool");
        }
        self.tools.insert(
            name.to_string(),
            Registration {
                description: description.to_string(),
                tool,
            },
        );
    }

    /// Register a plain function with an explicit schema
    pub fn register_fn<F>(&mut self, name: &str, description: &str, schema: ToolSchema, func: F)
    where
        F: Fn(ToolParams) -> ResearchResult<ToolOutput> + Send + Sync + 'static,
    {
        self.register(name, description, FnTool { func, schema });
    }

    /// Registered tools sorted by name
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .iter()
            .map(|(name, registration)| ToolInfo {
                name: name.clone(),
                description: registration.description.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn schema(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|r| r.tool.schema())
    }

    /// Invoke a tool by name and return its result verbatim
    pub async fn execute(&self, name: &str, params: ToolParams) -> ResearchResult<ToolOutput> {
        let registration = self
            .tools
            .get(name)
            .ok_or_else(|| ResearchError::tool_not_found(name))?;
        debug!(tool = name, ?params, "Executing tool");
        registration.tool.call(params).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            "echo",
            "Echo the x parameter",
            ToolSchema::new(vec![ParamSpec::new("x")]),
            |params| {
                let mut output = ToolOutput::new();
                output.insert("echoed".into(), params.get("x").cloned().unwrap_or(Value::Null));
                Ok(output)
            },
        );
        registry
    }

    fn params(value: Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let registry = echo_registry();
        let output = registry.execute("echo", params(json!({"x": 5}))).await.unwrap();
        assert_eq!(Value::Object(output), json!({"echoed": 5}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let registry = echo_registry();
        let err = registry.execute("nonexistent", ToolParams::new()).await.unwrap_err();
        assert!(matches!(err, ResearchError::ToolNotFound { ref name } if name == "nonexistent"));

        let empty = ToolRegistry::new();
        assert!(matches!(
            empty.execute("nonexistent", ToolParams::new()).await,
            Err(ResearchError::ToolNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let mut registry = echo_registry();
        registry.register_fn("echo", "Constant", ToolSchema::default(), |_| {
            Ok(params(json!({"constant": true})))
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].description, "Constant");
        let output = registry.execute("echo", params(json!({"x": 1}))).await.unwrap();
        assert_eq!(Value::Object(output), json!({"constant": true}));
    }

    #[test]
    fn test_schema_resolves_aliases() {
        let schema = ToolSchema::new(vec![
            ParamSpec::new("query").with_aliases(&["q", "search"]),
            ParamSpec::new("max_results").with_aliases(&["num_results"]),
        ])
        .with_query("query");

        assert_eq!(schema.resolve("Q"), Some("query"));
        assert_eq!(schema.resolve("num_results"), Some("max_results"));
        assert_eq!(schema.resolve("max_results"), Some("max_results"));
        assert_eq!(schema.resolve("language"), None);
        assert!(schema.is_search_like());
    }
}
