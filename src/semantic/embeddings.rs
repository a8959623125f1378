//! Embedding generation
//!
//! `Embedder` is the capability the search manager depends on. Two
//! implementations ship with the crate:
//!
//! - [`PromptedEmbedder`] asks a general text-generation backend to answer
//!   with a JSON array of floats. Malformed answers are an expected failure.
//! - [`HashingEmbedder`] is an offline feature-hashing model, useful when no
//!   backend is available and in tests.

use super::backend::TextGenerator;
use super::error::{Result, SemanticError};
use crate::utils::truncate_to_char_boundary;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use tracing::{debug, warn};

/// A fixed-length embedding vector
pub type Embedding = Vec<f32>;

/// Default cap on characters sent to the backend per text
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// Default number of texts handed to the backend per batch
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Turns text into vectors of a fixed dimension
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed one text
    ///
    /// On success the vector has exactly [`Embedder::dimension`] elements.
    fn generate_embedding(&self, text: &str) -> Result<Embedding>;

    /// Embed many texts, `batch_size` at a time
    ///
    /// Failed texts are logged and omitted. Successful embeddings are returned
    /// in input order, each tagged with the position of its source text.
    fn generate_embeddings_batch(&self, texts: &[&str], batch_size: usize) -> Vec<(usize, Embedding)> {
        let batch_size = batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            let offset = batch_idx * batch_size;
            debug!(batch = batch_idx, size = batch.len(), "Embedding batch");

            for (i, text) in batch.iter().enumerate() {
                match self.generate_embedding(text) {
                    Ok(embedding) => embeddings.push((offset + i, embedding)),
                    Err(e) => warn!(position = offset + i, error = %e, "Skipping text in batch"),
                }
            }
        }

        embeddings
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn generate_embedding(&self, text: &str) -> Result<Embedding> {
        (**self).generate_embedding(text)
    }
}

/// Embedder that prompts a text-generation backend for a JSON float array
pub struct PromptedEmbedder<G> {
    generator: G,
    dimension: usize,
    max_input_chars: usize,
}

impl<G: TextGenerator> PromptedEmbedder<G> {
    pub fn new(generator: G, dimension: usize) -> Self {
        Self {
            generator,
            dimension,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Cap the number of characters of each text included in the prompt
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    fn build_prompt(&self, text: &str) -> String {
        format!(
            "You are a text embedding model. Convert the following text into a vector \
             representation that captures its semantic meaning for similarity search.\n\n\
             Text to embed:\n{text}\n\n\
             Return ONLY a JSON array of {dim} floating point numbers. \
             Do not include any other text or explanation.",
            dim = self.dimension,
        )
    }

    /// Parse a backend answer, which must be nothing but a JSON array of `dimension` numbers
    fn parse_response(&self, response: &str) -> Result<Embedding> {
        let values: Vec<f32> = serde_json::from_str(response).map_err(|e| {
            SemanticError::Embedding(format!("backend response is not a JSON number array: {e}"))
        })?;

        if values.len() != self.dimension {
            return Err(SemanticError::Embedding(format!(
                "backend returned {} values, expected {}",
                values.len(),
                self.dimension
            )));
        }
        // Out-of-range literals such as 1e39 deserialize to infinity
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SemanticError::Embedding(
                "backend returned a non-finite value".into(),
            ));
        }

        Ok(values)
    }
}

impl<G: TextGenerator> Embedder for PromptedEmbedder<G> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn generate_embedding(&self, text: &str) -> Result<Embedding> {
        let text = truncate_to_char_boundary(text, self.max_input_chars);
        let prompt = self.build_prompt(text);
        let response = self.generator.generate_text(&prompt)?;
        self.parse_response(&response)
    }
}

/// Offline embedder using hashed word counts
///
/// Words are lowercased, split on non-alphanumerics, and hashed into one of
/// `dimension` buckets. The count vector is L2-normalised. Hashing uses
/// `FxHasher`, which is unseeded, so vectors are stable across runs.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 2)
            .map(str::to_lowercase)
    }

    fn bucket(&self, word: &str) -> usize {
        let mut hasher = FxHasher::default();
        hasher.write(word.as_bytes());
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn generate_embedding(&self, text: &str) -> Result<Embedding> {
        if self.dimension == 0 {
            return Err(SemanticError::Embedding("embedding dimension is zero".into()));
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for word in Self::tokenize(text) {
            embedding[self.bucket(&word)] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(SemanticError::Embedding("text has no indexable words".into()));
        }
        for val in &mut embedding {
            *val /= norm;
        }

        Ok(embedding)
    }
}
