//! Shared data types: configuration sections and LLM conversation primitives

use serde::{Deserialize, Serialize};

/// Top level configuration, one section per subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub research: ResearchConfig,
    pub web: WebConfig,
    pub retrieval: RetrievalConfig,
    pub storage: StorageConfig,
    pub logging: crate::logging::LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// openai, anthropic, ollama, groq, or `auto` to detect from API keys
    pub provider: String,
    pub model: String,
    /// Falls back to the provider's usual environment variable
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Extra attempts for transient transport failures
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hashing` for the deterministic local embedder, otherwise an LLM provider name
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Upper bound on reasoning/acting rounds
    pub max_iterations: usize,
    /// Tool used for fallbacks and when tool selection cannot be parsed
    pub default_search_tool: String,
    /// Extra search strategies requested from the LLM in quick research mode
    pub max_strategies: usize,
}

/// Knobs of the multi-round web research algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Default for the `web_search` tool
    pub max_search_results: usize,
    /// Result cap of the primary search
    pub primary_results: usize,
    /// Maximum number of follow-up searches executed
    pub followup_limit: usize,
    pub followup_results: usize,
    /// How many ranked results the content pass considers
    pub content_candidates: usize,
    pub max_content_items: usize,
    /// Content item cap once the list pass runs
    pub list_target: usize,
    /// The list pass runs while fewer content items than this were collected
    pub list_threshold: usize,
    pub max_domains: usize,
    pub list_max_domains: usize,
    pub content_chars: usize,
    pub list_content_chars: usize,
    /// Truncation applied by the fetcher itself
    pub fetch_max_chars: usize,
    pub politeness_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Inner product of L2-normalised vectors
    Cosine,
    /// Euclidean distance mapped to `1 / (1 + d)`
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Contiguous pre-normalised matrix, rebuilt after every batch insert or load
    Flat,
    /// Scan the document maps directly
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunk size for text splitting (in characters)
    pub chunk_size: usize,
    /// Overlap between chunks (in characters)
    pub chunk_overlap: usize,
    pub metric: SimilarityMetric,
    pub index: IndexKind,
    pub top_k: usize,
    pub default_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Defaults to `<data_dir>/embeddings`
    pub embeddings_dir: Option<String>,
    /// Defaults to `<data_dir>/sessions`
    pub sessions_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation overrides; `None` keeps the backend's configured value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}
