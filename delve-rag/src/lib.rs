//! Delve RAG - embeddings, vector store and knowledge-base retrieval
//!
//! Also home of the siumai-backed [`DelveLlmClient`], the production
//! implementation of [`delve_core::LlmBackend`].

pub mod embeddings;
pub mod llm_client;
pub mod retriever;
pub mod storage;
pub mod types;

pub use embeddings::*;
pub use llm_client::{auto_candidates, configs, create_auto_client, DelveLlmClient};
pub use retriever::*;
pub use storage::*;
pub use types::{Document, RagError, RagResult, ScoredDocument};

// Re-export commonly used types from siumai
pub use siumai::prelude::{LlmClient, Provider as LlmProvider};
