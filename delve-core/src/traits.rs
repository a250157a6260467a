//! Core trait definitions

use crate::error::DelveResult;
use crate::types::{ChatTurn, GenerationOptions};
use async_trait::async_trait;

/// Text generation backend driven by the research loop.
///
/// Transport failures are returned as errors; whether to retry is left to
/// the implementation or the caller.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Single prompt, single answer
    async fn query(&self, prompt: &str, options: &GenerationOptions) -> DelveResult<String>;

    /// Answer the last turn of an ordered conversation
    async fn chat(&self, history: &[ChatTurn], options: &GenerationOptions) -> DelveResult<String>;

    /// Short identifier used in logs
    fn name(&self) -> String {
        "llm".to_string()
    }
}
