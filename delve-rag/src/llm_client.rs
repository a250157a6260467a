//! LLM client integration using siumai
//!
//! [`DelveLlmClient`] is the production [`LlmBackend`]: it builds a siumai
//! client for the configured provider and wraps each call in a timeout and
//! a retry policy for transient transport failures.

use crate::types::{RagError, RagResult};
use async_trait::async_trait;
use delve_core::{
    retry_async, with_timeout, ChatRole, ChatTurn, DelveError, DelveResult, ErrorContext,
    GenerationOptions, LlmBackend, LlmConfig, RetryConfig,
};
use siumai::models;
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Unified LLM client that supports multiple providers
pub struct DelveLlmClient {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
    retry: RetryConfig,
}

impl DelveLlmClient {
    pub async fn new(config: LlmConfig) -> RagResult<Self> {
        let client = Self::build_client(&config).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            config.provider, config.model
        );

        let retry = RetryConfig {
            max_attempts: config.max_retries + 1,
            ..RetryConfig::default()
        };
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn api_key(config: &LlmConfig, env_var: &str, provider: &str) -> RagResult<String> {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| RagError::Config(format!("{} API key not found ({})", provider, env_var)))
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(config: &LlmConfig) -> RagResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = Self::api_key(config, "OPENAI_API_KEY", "OpenAI")?;
                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens);
                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }
                let client = builder
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build OpenAI client: {}", e)))?;
                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = Self::api_key(config, "ANTHROPIC_API_KEY", "Anthropic")?;
                let client = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| {
                        RagError::Llm(format!("Failed to build Anthropic client: {}", e))
                    })?;
                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                let client = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build Ollama client: {}", e)))?;
                Ok(Box::new(client))
            }
            "groq" => {
                let api_key = Self::api_key(config, "GROQ_API_KEY", "Groq")?;
                let client = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature)
                    .max_tokens(config.max_tokens)
                    .build()
                    .await
                    .map_err(|e| RagError::Llm(format!("Failed to build Groq client: {}", e)))?;
                Ok(Box::new(client))
            }
            provider => Err(RagError::Config(format!(
                "Unsupported LLM provider: {}",
                provider
            ))),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn llm_error(&self, message: String) -> DelveError {
        DelveError::Llm {
            message,
            provider: Some(self.config.provider.clone()),
            model: Some(self.config.model.clone()),
            context: ErrorContext::new("llm_client").with_operation("chat"),
        }
    }

    fn to_messages(history: &[ChatTurn], options: &GenerationOptions) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system_prompt) = &options.system_prompt {
            messages.push(system!(system_prompt.as_str()));
        }
        for turn in history {
            let message = match turn.role {
                ChatRole::System => system!(turn.content.as_str()),
                ChatRole::User => user!(turn.content.as_str()),
                ChatRole::Assistant => ChatMessage::assistant(turn.content.as_str()).build(),
            };
            messages.push(message);
        }
        messages
    }

    async fn chat_once(&self, messages: Vec<ChatMessage>) -> DelveResult<String> {
        let timeout_ms = self.config.timeout_secs.saturating_mul(1000);
        let response = with_timeout(self.client.chat(messages), timeout_ms, "llm_chat")
            .await?
            .map_err(|e| self.llm_error(format!("LLM generation failed: {}", e)))?;

        response
            .content_text()
            .map(str::to_string)
            .ok_or_else(|| self.llm_error("No text content in LLM response".to_string()))
    }
}

#[async_trait]
impl LlmBackend for DelveLlmClient {
    async fn query(&self, prompt: &str, options: &GenerationOptions) -> DelveResult<String> {
        self.chat(&[ChatTurn::user(prompt)], options).await
    }

    /// Sampling parameters are fixed when the client is built; only the
    /// system prompt of `options` applies per call.
    async fn chat(&self, history: &[ChatTurn], options: &GenerationOptions) -> DelveResult<String> {
        let start_time = Instant::now();
        debug!("Generating response with {} messages", history.len());

        let messages = Self::to_messages(history, options);
        let content = retry_async(
            || self.chat_once(messages.clone()),
            &self.retry,
            "llm_chat",
        )
        .await?;

        info!(
            "Generated response in {:?} ({} chars)",
            start_time.elapsed(),
            content.len()
        );
        Ok(content)
    }

    fn name(&self) -> String {
        format!("{}/{}", self.config.provider, self.config.model)
    }
}

/// Helper functions for creating common LLM configurations
pub mod configs {
    use super::*;

    pub fn openai_gpt4o_mini() -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            model: models::openai::GPT_4O_MINI.to_string(),
            ..LlmConfig::default()
        }
    }

    pub fn anthropic_claude_haiku() -> LlmConfig {
        LlmConfig {
            provider: "anthropic".to_string(),
            model: models::anthropic::CLAUDE_HAIKU_3_5.to_string(),
            ..LlmConfig::default()
        }
    }

    pub fn ollama_llama3(base_url: Option<String>) -> LlmConfig {
        LlmConfig {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            base_url: base_url.or_else(|| Some("http://localhost:11434".to_string())),
            ..LlmConfig::default()
        }
    }

    pub fn groq_llama3() -> LlmConfig {
        LlmConfig {
            provider: "groq".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            ..LlmConfig::default()
        }
    }
}

/// Candidate configurations for auto-detection, in preference order.
///
/// Providers whose key `has_key` reports as present come first; a local
/// Ollama server is always the last resort. Generation settings are taken
/// from `base`.
pub fn auto_candidates(base: &LlmConfig, has_key: impl Fn(&str) -> bool) -> Vec<LlmConfig> {
    let presets = [
        ("OPENAI_API_KEY", configs::openai_gpt4o_mini()),
        ("ANTHROPIC_API_KEY", configs::anthropic_claude_haiku()),
        ("GROQ_API_KEY", configs::groq_llama3()),
    ];

    presets
        .into_iter()
        .filter(|(env_var, _)| has_key(env_var))
        .map(|(_, preset)| preset)
        .chain(std::iter::once(configs::ollama_llama3(base.base_url.clone())))
        .map(|preset| LlmConfig {
            provider: preset.provider,
            model: preset.model,
            base_url: preset.base_url,
            api_key: None,
            ..base.clone()
        })
        .collect()
}

/// Create a client for whichever provider has credentials in the
/// environment, falling back to a local Ollama server
pub async fn create_auto_client(base: &LlmConfig) -> RagResult<DelveLlmClient> {
    let mut candidates = auto_candidates(base, |var| std::env::var(var).is_ok());
    let fallback = candidates.pop();

    for config in candidates {
        let provider = config.provider.clone();
        info!("Auto-detected {} provider", provider);
        match DelveLlmClient::new(config).await {
            Ok(client) => return Ok(client),
            Err(e) => warn!("Failed to create {} client: {}", provider, e),
        }
    }

    info!("Trying Ollama as fallback");
    match fallback {
        Some(config) => DelveLlmClient::new(config).await,
        None => DelveLlmClient::new(configs::ollama_llama3(None)).await,
    }
}
