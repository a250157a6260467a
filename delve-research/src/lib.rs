//! Delve Research - iterative, tool-driven web research
//!
//! This crate builds on the retrieval layer in delve-rag and provides:
//!
//! - A tool registry with web search, page fetching, list and knowledge-base tools
//! - A multi-round web research engine with follow-up queries and relevance ranking
//! - A reasoning/acting loop that plans research needs, runs tools and judges sufficiency
//! - A synthesizer that turns accumulated findings into a cited answer
//!
//! ## Architecture
//!
//! - **Retrieval** (delve-rag): embeddings, vector store, LLM client
//! - **Research** (this crate): tools, web engine, loop controller
//! - **Presentation** (delve-cli): command line interface

pub mod research;
pub mod tools;
pub mod web;

pub use research::{
    ReactConfig, ReactResearcher, ResearchAnswer, ResearchAssistant, ResearchContext,
    ResearchSynthesizer,
};
pub use tools::{default_registry, Tool, ToolInfo, ToolOutput, ToolParams, ToolRegistry};
pub use web::{
    format_research_for_prompt, ContentItem, DuckDuckGoClient, SearchResult, WebClient,
    WebResearchReport, WebResearcher,
};

/// Research-level error type
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// The registry has no tool with this name
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool '{tool}' got an invalid or missing parameter '{parameter}'")]
    InvalidParameter { tool: String, parameter: String },

    #[error("RAG error: {0}")]
    Rag(#[from] delve_rag::RagError),

    #[error("Core error: {0}")]
    Core(#[from] delve_core::DelveError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ResearchResult<T> = Result<T, ResearchError>;

impl ResearchError {
    pub fn tool_not_found<S: Into<String>>(name: S) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn tool_execution<T: Into<String>, M: Into<String>>(tool: T, message: M) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter<T: Into<String>, P: Into<String>>(tool: T, parameter: P) -> Self {
        Self::InvalidParameter {
            tool: tool.into(),
            parameter: parameter.into(),
        }
    }
}
