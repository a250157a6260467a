//! Vector store with named, file-backed collections
//!
//! Documents and embeddings live in two maps keyed by doc_id. Each
//! collection is persisted under `<embeddings_dir>/<collection>/` as
//! `documents.json` (doc_id → document) and `embeddings.json`
//! (doc_id → vector).

use crate::embeddings::l2_normalize;
use crate::types::{Document, RagError, RagResult, ScoredDocument};
use delve_core::{IndexKind, SimilarityMetric};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DOCUMENTS_FILE: &str = "documents.json";
const EMBEDDINGS_FILE: &str = "embeddings.json";

/// Dense row-major matrix of the stored vectors.
///
/// Rows are pre-normalised for the cosine metric so a query costs one dot
/// product per document.
#[derive(Debug, Default)]
struct FlatIndex {
    doc_ids: Vec<String>,
    data: Vec<f32>,
    dimension: usize,
}

impl FlatIndex {
    fn build(embeddings: &BTreeMap<String, Vec<f32>>, metric: SimilarityMetric) -> Self {
        let dimension = embeddings.values().next().map(Vec::len).unwrap_or(0);
        let mut doc_ids = Vec::with_capacity(embeddings.len());
        let mut data = Vec::with_capacity(embeddings.len() * dimension);

        for (doc_id, vector) in embeddings {
            let mut row = vector.clone();
            if metric == SimilarityMetric::Cosine {
                l2_normalize(&mut row);
            }
            doc_ids.push(doc_id.clone());
            data.extend(row);
        }

        Self {
            doc_ids,
            data,
            dimension,
        }
    }

    fn rows(&self) -> impl Iterator<Item = (&String, &[f32])> {
        self.doc_ids
            .iter()
            .zip(self.data.chunks(self.dimension.max(1)))
    }
}

pub struct VectorStore {
    documents: BTreeMap<String, Document>,
    embeddings: BTreeMap<String, Vec<f32>>,
    metric: SimilarityMetric,
    index_kind: IndexKind,
    index: Option<FlatIndex>,
    embeddings_dir: PathBuf,
}

impl VectorStore {
    pub fn new<P: AsRef<Path>>(embeddings_dir: P, metric: SimilarityMetric, index_kind: IndexKind) -> Self {
        Self {
            documents: BTreeMap::new(),
            embeddings: BTreeMap::new(),
            metric,
            index_kind,
            index: None,
            embeddings_dir: embeddings_dir.as_ref().to_path_buf(),
        }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    /// Dimension of the stored vectors, if any are stored
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.values().next().map(Vec::len)
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.embeddings.clear();
        self.index = None;
    }

    /// Insert a batch of documents with their embeddings and persist the
    /// collection.
    ///
    /// Documents without an id get `doc_<n>`. Re-inserting an id replaces
    /// both the document and its embedding. A failed save is logged; the
    /// in-memory state stays authoritative.
    pub fn add_embeddings(
        &mut self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
        collection: &str,
    ) -> RagResult<()> {
        if documents.len() != embeddings.len() {
            return Err(RagError::Validation(format!(
                "Got {} documents but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        let expected = self
            .dimension()
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(RagError::Validation(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected,
                    bad.len()
                )));
            }
        }

        let added = documents.len();
        for (mut document, embedding) in documents.into_iter().zip(embeddings) {
            let doc_id = match &document.doc_id {
                Some(id) => id.clone(),
                None => {
                    let id = self.next_doc_id();
                    document.doc_id = Some(id.clone());
                    id
                }
            };
            self.documents.insert(doc_id.clone(), document);
            self.embeddings.insert(doc_id, embedding);
        }

        self.rebuild_index();
        info!(added, total = self.len(), collection, "Added documents to vector store");

        if !self.save_collection(collection) {
            warn!(collection, "Collection not persisted, keeping in-memory state");
        }
        Ok(())
    }

    fn next_doc_id(&self) -> String {
        let mut n = self.documents.len();
        loop {
            let candidate = format!("doc_{}", n);
            if !self.documents.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn rebuild_index(&mut self) {
        self.index = match self.index_kind {
            IndexKind::Flat if !self.embeddings.is_empty() => {
                Some(FlatIndex::build(&self.embeddings, self.metric))
            }
            _ => None,
        };
    }

    /// Return at most `k` documents most similar to the query, best first.
    ///
    /// Equal scores are ordered by doc_id. A query whose dimension does not
    /// match the stored vectors yields no results.
    pub fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredDocument> {
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }

        if self.dimension() != Some(query_embedding.len()) {
            warn!(
                expected = ?self.dimension(),
                got = query_embedding.len(),
                "Query embedding dimension mismatch"
            );
            return Vec::new();
        }

        let mut query = query_embedding.to_vec();
        if self.metric == SimilarityMetric::Cosine {
            l2_normalize(&mut query);
        }

        let mut scored: Vec<(&String, f32)> = match &self.index {
            Some(index) => index
                .rows()
                .map(|(doc_id, row)| (doc_id, self.score(&query, row, true)))
                .collect(),
            None => self
                .embeddings
                .iter()
                .map(|(doc_id, vector)| (doc_id, self.score(&query, vector, false)))
                .collect(),
        };

        // Stable sort over doc_id order keeps ties deterministic
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        debug!(k, metric = ?self.metric, "Similarity search complete");

        scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                self.documents
                    .get(doc_id)
                    .map(|document| (document.clone(), score))
            })
            .collect()
    }

    fn score(&self, query: &[f32], stored: &[f32], prenormalized: bool) -> f32 {
        match self.metric {
            SimilarityMetric::Cosine if prenormalized => dot(query, stored),
            SimilarityMetric::Cosine => {
                let mut row = stored.to_vec();
                l2_normalize(&mut row);
                dot(query, &row)
            }
            SimilarityMetric::L2 => {
                let distance = query
                    .iter()
                    .zip(stored)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.embeddings_dir.join(collection)
    }

    /// Write the whole in-memory state under `collection`
    pub fn save_collection(&self, collection: &str) -> bool {
        match self.try_save(collection) {
            Ok(()) => {
                debug!(collection, documents = self.len(), "Saved collection");
                true
            }
            Err(e) => {
                warn!(collection, error = %e, "Failed to save collection");
                false
            }
        }
    }

    fn try_save(&self, collection: &str) -> RagResult<()> {
        let dir = self.collection_dir(collection);
        std::fs::create_dir_all(&dir)
            .map_err(|e| RagError::Persistence(format!("{}: {}", dir.display(), e)))?;

        let documents = serde_json::to_string(&self.documents)?;
        let embeddings = serde_json::to_string(&self.embeddings)?;
        std::fs::write(dir.join(DOCUMENTS_FILE), documents)
            .map_err(|e| RagError::Persistence(format!("writing documents: {}", e)))?;
        std::fs::write(dir.join(EMBEDDINGS_FILE), embeddings)
            .map_err(|e| RagError::Persistence(format!("writing embeddings: {}", e)))?;
        Ok(())
    }

    /// Replace the in-memory state with a persisted collection.
    ///
    /// Returns `false` and leaves the store untouched when the artifacts
    /// are missing, unreadable or inconsistent.
    pub fn load_collection(&mut self, collection: &str) -> bool {
        match self.try_load(collection) {
            Ok((documents, embeddings)) => {
                self.documents = documents;
                self.embeddings = embeddings;
                self.rebuild_index();
                info!(collection, documents = self.len(), "Loaded collection");
                true
            }
            Err(e) => {
                debug!(collection, error = %e, "Collection not loaded");
                false
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn try_load(
        &self,
        collection: &str,
    ) -> RagResult<(BTreeMap<String, Document>, BTreeMap<String, Vec<f32>>)> {
        let dir = self.collection_dir(collection);
        let documents = std::fs::read_to_string(dir.join(DOCUMENTS_FILE))
            .map_err(|e| RagError::Persistence(format!("reading documents: {}", e)))?;
        let embeddings = std::fs::read_to_string(dir.join(EMBEDDINGS_FILE))
            .map_err(|e| RagError::Persistence(format!("reading embeddings: {}", e)))?;

        let documents: BTreeMap<String, Document> = serde_json::from_str(&documents)?;
        let embeddings: BTreeMap<String, Vec<f32>> = serde_json::from_str(&embeddings)?;

        if documents.len() != embeddings.len()
            || documents.keys().any(|id| !embeddings.contains_key(id))
        {
            return Err(RagError::Persistence(
                "document and embedding maps disagree".to_string(),
            ));
        }

        let dimension = embeddings.values().next().map(Vec::len);
        if embeddings.values().any(|v| Some(v.len()) != dimension) {
            return Err(RagError::Persistence(
                "stored embeddings have mixed dimensions".to_string(),
            ));
        }

        Ok((documents, embeddings))
    }

    /// Names of the collections present on disk
    pub fn list_collections(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.embeddings_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().join(DOCUMENTS_FILE).is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
