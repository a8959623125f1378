//! Semantic search manager
//!
//! The only entry point the rest of the application uses. Generates
//! embeddings for file contents and queries, delegates storage and lookup to
//! the [`VectorIndexStore`], and turns raw distances into ranked results.
//! Failures are logged and reported as `false` or an empty result set; they
//! never escape as errors.

use super::{
    cache::QueryCache,
    embeddings::{Embedder, Embedding},
    error::{Result, SemanticError},
    store::VectorIndexStore,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Default number of results returned by a search
pub const DEFAULT_SEARCH_K: usize = 5;

/// Default number of query embeddings kept in memory
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 128;

/// A file and its content, as supplied by the caller for indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

impl FileContent {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    /// `1 / (1 + distance)`, in (0, 1]
    pub relevance_score: f32,
    /// Squared L2 distance between query and file embeddings
    pub distance: f32,
}

impl SearchResult {
    pub fn new(file_path: String, distance: f32) -> Self {
        Self {
            file_path,
            relevance_score: relevance_from_distance(distance),
            distance,
        }
    }
}

/// Map a squared L2 distance onto (0, 1], with 0 → 1.0
pub fn relevance_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub index_location: PathBuf,
    pub dimension: usize,
    pub cached_queries: usize,
}

/// Semantic file search manager
pub struct SearchManager<E> {
    embedder: E,
    store: VectorIndexStore,
    query_cache: QueryCache,
}

impl<E: Embedder> SearchManager<E> {
    /// Create a manager from an embedder and an opened store
    ///
    /// Fails if the two disagree on the vector dimension, or if it is zero.
    pub fn new(embedder: E, store: VectorIndexStore) -> Result<Self> {
        if store.dimension() == 0 {
            return Err(SemanticError::ZeroDimension);
        }
        if embedder.dimension() != store.dimension() {
            return Err(SemanticError::DimensionMismatch {
                expected: store.dimension(),
                got: embedder.dimension(),
            });
        }

        Ok(Self {
            embedder,
            store,
            query_cache: QueryCache::new(DEFAULT_QUERY_CACHE_CAPACITY),
        })
    }

    /// Set the query cache capacity (0 disables caching)
    pub fn with_query_cache_capacity(mut self, capacity: usize) -> Self {
        self.query_cache = QueryCache::new(capacity);
        self
    }

    /// Index a single file, replacing any previous entry for the same path
    pub fn index_file(&mut self, file_path: &str, content: &str) -> bool {
        debug!(path = file_path, "Indexing file");

        let embedding = match self.embedder.generate_embedding(content) {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(path = file_path, error = %e, "Failed to generate embedding");
                return false;
            }
        };

        match self.store.add_vectors(&[embedding], &[file_path]) {
            Ok(()) => {
                info!(path = file_path, "Indexed file");
                true
            }
            Err(e) => {
                error!(path = file_path, error = %e, "Failed to add file to index");
                false
            }
        }
    }

    /// Index several files independently, reporting success per path
    pub fn index_files(&mut self, files: &[FileContent]) -> FxHashMap<String, bool> {
        let mut results = FxHashMap::default();
        for file in files {
            let success = self.index_file(&file.path, &file.content);
            results.insert(file.path.clone(), success);
        }

        let failed = results.values().filter(|ok| !**ok).count();
        if failed > 0 {
            warn!(failed, total = files.len(), "Some files could not be indexed");
        }

        results
    }

    /// Index files `batch_size` at a time with one store write per batch
    ///
    /// Reports per path like [`SearchManager::index_files`]. A file whose
    /// embedding fails is `false`; a failed store write fails its whole batch.
    pub fn index_files_batched(
        &mut self,
        files: &[FileContent],
        batch_size: usize,
    ) -> FxHashMap<String, bool> {
        let mut results: FxHashMap<String, bool> =
            files.iter().map(|f| (f.path.clone(), false)).collect();

        for batch in files.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
            let embedded = self.embedder.generate_embeddings_batch(&texts, texts.len());
            if embedded.is_empty() {
                continue;
            }

            let (positions, vectors): (Vec<usize>, Vec<Embedding>) = embedded.into_iter().unzip();
            let paths: Vec<&str> = positions.iter().map(|&i| batch[i].path.as_str()).collect();

            match self.store.add_vectors(&vectors, &paths) {
                Ok(()) => {
                    for path in paths {
                        results.insert(path.to_string(), true);
                    }
                }
                Err(e) => error!(files = paths.len(), error = %e, "Failed to add batch to index"),
            }
        }

        results
    }

    /// Find the `k` files most similar to `query`, best match first
    ///
    /// Surrounding whitespace is not part of the query.
    pub fn search(&mut self, query: &str, k: usize) -> Vec<SearchResult> {
        if k == 0 {
            return Vec::new();
        }

        // The cache key and the embedded text must be the same string
        let query = query.trim();

        let Some(query_embedding) = self.query_embedding(query) else {
            return Vec::new();
        };

        match self.store.search(&query_embedding, k) {
            Ok(neighbors) => {
                let results: Vec<SearchResult> = neighbors
                    .into_iter()
                    .map(|(path, distance)| SearchResult::new(path, distance))
                    .collect();
                debug!(query, results = results.len(), "Search completed");
                results
            }
            Err(e) => {
                error!(query, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    fn query_embedding(&mut self, query: &str) -> Option<Embedding> {
        if let Some(cached) = self.query_cache.get(query) {
            return Some(cached.clone());
        }

        match self.embedder.generate_embedding(query) {
            Ok(embedding) => {
                self.query_cache.insert(query, embedding.clone());
                Some(embedding)
            }
            Err(e) => {
                error!(query, error = %e, "Failed to generate query embedding");
                None
            }
        }
    }

    /// Remove a file from the index; removing an unindexed file succeeds
    pub fn remove_file(&mut self, file_path: &str) -> bool {
        match self.store.remove_file(file_path) {
            Ok(removed) => {
                if removed {
                    info!(path = file_path, "Removed file from index");
                }
                true
            }
            Err(e) => {
                error!(path = file_path, error = %e, "Failed to remove file from index");
                false
            }
        }
    }

    pub fn is_indexed(&self, file_path: &str) -> bool {
        self.store.contains(file_path)
    }

    pub fn get_index_stats(&self) -> IndexStats {
        IndexStats {
            total_files: self.store.get_total_files(),
            index_location: self.store.path_prefix().to_path_buf(),
            dimension: self.store.dimension(),
            cached_queries: self.query_cache.len(),
        }
    }

    /// Persist any deferred changes
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub fn store(&self) -> &VectorIndexStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}
