//! Types for the reasoning/acting research loop

use crate::tools::{ToolOutput, ToolParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Case- and whitespace-insensitive form used to compare research needs
pub fn normalize_need(need: &str) -> String {
    need.trim().to_lowercase()
}

/// A tool call chosen for one research need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: ToolParams,
}

/// Successful tool result recorded against the need it answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub need: String,
    pub tool_name: String,
    pub result: ToolOutput,
}

/// Outcome of one tool attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Observation {
    Success { tool_name: String, result: ToolOutput },
    Error { tool_name: String, error: String },
}

impl Observation {
    pub fn tool_name(&self) -> &str {
        match self {
            Observation::Success { tool_name, .. } | Observation::Error { tool_name, .. } => {
                tool_name
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Observation::Error { .. })
    }
}

/// One THINK/ACT/EVALUATE round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub needs: Vec<String>,
    /// Every attempt in order, fallbacks included
    pub actions: Vec<ToolInvocation>,
    /// Parallel to `actions`
    pub observations: Vec<Observation>,
    pub complete: bool,
}

/// State of a single research call, owned by the loop that created it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchContext {
    pub query: String,
    pub iterations: Vec<IterationRecord>,
    /// Tool name of every attempt, in order
    pub tools_used: Vec<String>,
    pub findings: Vec<Finding>,
    pub timestamp: DateTime<Utc>,
    /// Whether the LLM judged the research sufficient before the iteration bound
    pub completed: bool,
    pub final_answer: Option<String>,
}

impl ResearchContext {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            iterations: Vec::new(),
            tools_used: Vec::new(),
            findings: Vec::new(),
            timestamp: Utc::now(),
            completed: false,
            final_answer: None,
        }
    }

    /// Whether some finding already answers this need
    pub fn is_resolved(&self, need: &str) -> bool {
        let normalized = normalize_need(need);
        self.findings
            .iter()
            .any(|finding| normalize_need(&finding.need) == normalized)
    }
}
