//! Embedding generation
//!
//! Two interchangeable strategies behind the [`Embedder`] trait: a
//! deterministic feature-hashing embedder that needs no network, and a
//! provider-backed embedder that calls an embedding model through siumai.
//! The strategy is chosen explicitly from configuration.

use crate::types::{RagError, RagResult};
use async_trait::async_trait;
use delve_core::EmbeddingConfig;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use siumai::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns text into fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;

    async fn embed_text(&self, text: &str) -> RagResult<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Embedder returned no vector".to_string()))
    }

    /// Output dimension when known up front
    fn dimension(&self) -> Option<usize>;

    fn name(&self) -> &str;
}

/// Scale a vector to unit length in place; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Bag-of-words feature hashing.
///
/// Each lowercased whitespace token is assigned to one of `dimension`
/// buckets by a SHA-256 based hash, bucket values are token counts and the
/// result is L2-normalised. The output depends only on the input text.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.dimension as u64) as usize
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for word in lowered.split_whitespace() {
            *counts.entry(word).or_insert(0) += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (word, count) in counts {
            vector[self.bucket(word)] += count as f32;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Embeddings from a remote or local model through siumai
pub struct SiumaiEmbedder {
    client: Box<dyn LlmClient>,
    config: EmbeddingConfig,
    name: String,
}

impl SiumaiEmbedder {
    pub async fn new(config: EmbeddingConfig) -> RagResult<Self> {
        let client = Self::build_client(&config).await?;
        let name = format!("{}/{}", config.provider, config.model);

        info!(
            provider = %config.provider,
            model = %config.model,
            batch_size = config.batch_size,
            "Initialized embedding client"
        );

        Ok(Self {
            client,
            config,
            name,
        })
    }

    async fn build_client(config: &EmbeddingConfig) -> RagResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| RagError::Config("OpenAI API key not found".to_string()))?;
                let client = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .build()
                    .await
                    .map_err(|e| {
                        RagError::Embedding(format!("Failed to create OpenAI client: {}", e))
                    })?;
                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string());
                let client = LlmBuilder::new()
                    .ollama()
                    .base_url(&base_url)
                    .model(&config.model)
                    .build()
                    .await
                    .map_err(|e| {
                        RagError::Embedding(format!("Failed to create Ollama client: {}", e))
                    })?;
                Ok(Box::new(client))
            }
            provider => Err(RagError::Config(format!(
                "Unsupported embedding provider: {}",
                provider
            ))),
        }
    }
}

#[async_trait]
impl Embedder for SiumaiEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let capability = self.client.as_embedding_capability().ok_or_else(|| {
            RagError::Config(format!(
                "Provider {} does not support embeddings",
                self.config.provider
            ))
        })?;

        let batch_size = self.config.batch_size.max(1);
        let batches = texts.len().div_ceil(batch_size);
        let progress = if batches > 1 {
            let pb = ProgressBar::new(texts.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner} [{bar:40}] {pos}/{len} embeddings ({eta})")
            {
                pb.set_style(style);
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let response = capability
                .embed(batch.to_vec())
                .await
                .map_err(|e| RagError::Embedding(format!("Embedding generation failed: {}", e)))?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Expected {} embeddings, provider returned {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings);
            progress.inc(batch.len() as u64);
        }
        progress.finish_and_clear();

        debug!(count = vectors.len(), "Generated embeddings");
        Ok(vectors)
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the embedder named by the configuration
pub async fn create_embedder(config: &EmbeddingConfig) -> RagResult<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        _ => Ok(Arc::new(SiumaiEmbedder::new(config.clone()).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_text("Rust ownership and borrowing").await.unwrap();
        let b = embedder.embed_text("Rust ownership and borrowing").await.unwrap();

        assert_eq!(a.len(), 100);
        assert_eq!(
            a.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_hashing_embedder_distinguishes_texts() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_sync("the quick brown fox");
        let b = embedder.embed_sync("lazy dogs sleep all");
        assert_eq!("the quick brown fox".len(), "lazy dogs sleep all".len());
        assert_ne!(a, b);
    }

    #[test]
    fn test_hashing_embedder_is_case_insensitive_and_normalized() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed_sync("Apple apple APPLE banana");
        assert_eq!(v, embedder.embed_sync("apple banana apple apple"));

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_gives_zero_vector() {
        let v = HashingEmbedder::new(8).embed_sync("   ");
        assert_eq!(v, vec![0.0; 8]);
    }
}
