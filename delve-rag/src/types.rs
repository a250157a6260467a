//! Type definitions for the retrieval layer

use delve_core::DelveError;
use thiserror::Error;

pub use delve_indexing::Document;

/// Errors that can occur in the retrieval layer
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Collection load or save failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(Box<DelveError>),
}

impl From<DelveError> for RagError {
    fn from(err: DelveError) -> Self {
        RagError::Core(Box::new(err))
    }
}

pub type RagResult<T> = Result<T, RagError>;

/// A stored document together with its similarity to the query
pub type ScoredDocument = (Document, f32);
