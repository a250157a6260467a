//! Knowledge base: chunk, embed, store and query documents

use crate::embeddings::Embedder;
use crate::storage::VectorStore;
use crate::types::{Document, RagResult, ScoredDocument};
use delve_core::DelveConfig;
use delve_indexing::DocumentProcessor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A fetched web page to ingest
#[derive(Debug, Clone, Copy)]
pub struct WebPage<'a> {
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub text: &'a str,
}

/// Retrieval front-end combining the document processor, an embedder and
/// the vector store
pub struct Retriever {
    processor: DocumentProcessor,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    default_collection: String,
}

impl Retriever {
    /// Create a retriever and load the default collection if it exists
    pub fn new(config: &DelveConfig, embedder: Arc<dyn Embedder>) -> Self {
        let store = VectorStore::new(
            config.storage.embeddings_path(),
            config.retrieval.metric,
            config.retrieval.index,
        );
        Self::with_store(
            DocumentProcessor::from_config(&config.retrieval),
            embedder,
            store,
            &config.retrieval.default_collection,
        )
    }

    pub fn with_store(
        processor: DocumentProcessor,
        embedder: Arc<dyn Embedder>,
        mut store: VectorStore,
        default_collection: &str,
    ) -> Self {
        if !store.load_collection(default_collection) {
            debug!(
                collection = default_collection,
                "Starting with an empty collection"
            );
        }
        Self {
            processor,
            embedder,
            store,
            default_collection: default_collection.to_string(),
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    /// Switch to another persisted collection
    pub fn load_collection(&mut self, collection: &str) -> bool {
        self.store.load_collection(collection)
    }

    /// Chunk, embed and store documents; returns the number of chunks added
    pub async fn add_documents(
        &mut self,
        documents: &[Document],
        collection: Option<&str>,
    ) -> RagResult<usize> {
        let chunks: Vec<Document> = documents
            .iter()
            .flat_map(|document| self.processor.process_document(document))
            .filter(|chunk| !chunk.text.trim().is_empty())
            .collect();
        self.add_chunks(chunks, collection).await
    }

    async fn add_chunks(
        &mut self,
        chunks: Vec<Document>,
        collection: Option<&str>,
    ) -> RagResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts).await?;
        let count = chunks.len();

        let collection = collection
            .unwrap_or(self.default_collection.as_str())
            .to_string();
        self.store.add_embeddings(chunks, embeddings, &collection)?;

        info!(
            chunks = count,
            embedder = self.embedder.name(),
            elapsed = ?start.elapsed(),
            "Indexed chunks"
        );
        Ok(count)
    }

    pub async fn add_web_content(
        &mut self,
        text: &str,
        url: &str,
        title: Option<&str>,
        collection: Option<&str>,
    ) -> RagResult<usize> {
        let chunks = self.processor.process_text_from_web(text, url, title);
        self.add_chunks(chunks, collection).await
    }

    /// Chunk and index a local UTF-8 text file
    pub async fn add_file(&mut self, path: &Path, collection: Option<&str>) -> RagResult<usize> {
        let chunks = self.processor.process_file(path).await?;
        self.add_chunks(chunks, collection).await
    }

    /// Ingest every page of a web research run
    pub async fn add_web_research(
        &mut self,
        pages: &[WebPage<'_>],
        collection: Option<&str>,
    ) -> RagResult<usize> {
        let chunks: Vec<Document> = pages
            .iter()
            .filter(|page| !page.text.trim().is_empty())
            .flat_map(|page| {
                self.processor
                    .process_text_from_web(page.text, page.url, page.title)
            })
            .collect();
        self.add_chunks(chunks, collection).await
    }

    pub async fn query(&self, text: &str, k: usize) -> RagResult<Vec<ScoredDocument>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_text(text).await?;
        Ok(self.store.similarity_search(&embedding, k))
    }
}

/// Render retrieved documents as a prompt section
pub fn format_context_for_prompt(results: &[ScoredDocument]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut context = String::from("RELEVANT INFORMATION FROM KNOWLEDGE BASE:\n\n");
    for (i, (document, _score)) in results.iter().enumerate() {
        let source = document.url().unwrap_or("Unknown");
        context.push_str(&format!(
            "[DOCUMENT {}] (Source: {})\n{}\n\n",
            i + 1,
            source,
            document.text
        ));
    }
    context
}
