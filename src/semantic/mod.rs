//! Semantic file search
//!
//! Embeds file contents, keeps the vectors in a persistent nearest-neighbor
//! index keyed by file path, and answers natural-language queries.

pub mod backend;
pub mod cache;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod store;
pub mod vector_index;

pub use backend::{OllamaGenerator, TextGenerator};
pub use cache::QueryCache;
pub use embeddings::{Embedder, Embedding, HashingEmbedder, PromptedEmbedder};
pub use engine::{FileContent, IndexStats, SearchManager, SearchResult};
pub use error::SemanticError;
pub use store::{PersistMode, VectorIndexStore};
pub use vector_index::FlatL2Index;
