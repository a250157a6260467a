//! Configuration management

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::types::*;

use std::path::{Path, PathBuf};

const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "anthropic", "ollama", "groq"];

/// `llm.provider` value that picks a provider from the API keys in the environment
pub const AUTO_LLM_PROVIDER: &str = "auto";

impl Default for DelveConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            research: ResearchConfig::default(),
            web: WebConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 100,
            batch_size: 64,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            default_search_tool: "web_search".to_string(),
            max_strategies: 3,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            timeout_secs: 60,
            max_search_results: 5,
            primary_results: 15,
            followup_limit: 7,
            followup_results: 7,
            content_candidates: 20,
            max_content_items: 15,
            list_target: 20,
            list_threshold: 8,
            max_domains: 7,
            list_max_domains: 10,
            content_chars: 7500,
            list_content_chars: 10000,
            fetch_max_chars: 12000,
            politeness_delay_ms: 500,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            metric: SimilarityMetric::Cosine,
            index: IndexKind::Flat,
            top_k: 5,
            default_collection: "default".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("delve"))
            .unwrap_or_else(|| PathBuf::from(".delve"));
        Self {
            data_dir: data_dir.to_string_lossy().into_owned(),
            embeddings_dir: None,
            sessions_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        match &self.embeddings_dir {
            Some(dir) => expand_home(dir),
            None => self.data_path().join("embeddings"),
        }
    }

    pub fn sessions_path(&self) -> PathBuf {
        match &self.sessions_dir {
            Some(dir) => expand_home(dir),
            None => self.data_path().join("sessions"),
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn invalid(message: &str, suggestion: &str) -> DelveError {
    DelveError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file; missing sections take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_metadata("path", &path.display().to_string())
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DelveConfig = toml::from_str(&content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> DelveResult<()> {
        if self.llm.provider != AUTO_LLM_PROVIDER
            && !KNOWN_LLM_PROVIDERS.contains(&self.llm.provider.as_str())
        {
            return Err(invalid(
                &format!("Unknown LLM provider '{}'", self.llm.provider),
                "Use one of: auto, openai, anthropic, ollama, groq",
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid(
                "LLM temperature must be between 0.0 and 2.0",
                "Set llm.temperature to a value in [0, 2]",
            ));
        }

        if self.embedding.provider != "hashing"
            && !KNOWN_LLM_PROVIDERS.contains(&self.embedding.provider.as_str())
        {
            return Err(invalid(
                &format!("Unknown embedding provider '{}'", self.embedding.provider),
                "Use 'hashing' or an LLM provider name",
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(invalid(
                "Embedding dimension must be greater than 0",
                "Set embedding.dimension to a positive value",
            ));
        }

        if self.research.max_iterations == 0 {
            return Err(invalid(
                "research.max_iterations must be greater than 0",
                "Set research.max_iterations to a positive value",
            ));
        }

        if self.retrieval.chunk_size == 0
            || self.retrieval.chunk_overlap >= self.retrieval.chunk_size
        {
            return Err(invalid(
                "retrieval.chunk_overlap must be smaller than a non-zero retrieval.chunk_size",
                "Lower retrieval.chunk_overlap or raise retrieval.chunk_size",
            ));
        }

        Ok(())
    }

    /// Create the data, embeddings and sessions directories.
    ///
    /// This is the one storage failure that is fatal at startup.
    pub fn ensure_directories(&self) -> DelveResult<()> {
        for dir in [
            self.storage.data_path(),
            self.storage.embeddings_path(),
            self.storage.sessions_path(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| DelveError::Storage {
                message: format!("Failed to create directory {}: {}", dir.display(), e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("ensure_directories")
                    .with_suggestion("Check permissions or set storage.data_dir"),
            })?;
        }
        Ok(())
    }
}
