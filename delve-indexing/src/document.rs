//! Document type shared by the processor and the retrieval store

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A unit of text with provenance metadata.
///
/// Web-derived documents always carry `source` and `url` metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
            doc_id: None,
        }
    }

    pub fn with_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// String-valued metadata lookup
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Source URL, if the document came from the web
    pub fn url(&self) -> Option<&str> {
        self.metadata_str("url")
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata_str("title")
    }
}
