//! Exact nearest neighbor index
//!
//! Brute-force squared-L2 search over a flat vector buffer. Every vector
//! carries a caller-assigned `u64` ID so entries can be removed without
//! renumbering the rest.

use super::error::{Result, SemanticError};
use serde::{Deserialize, Serialize};

/// Flat (exhaustive) squared-L2 index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatL2Index {
    dimension: usize,
    ids: Vec<u64>,
    vectors: Vec<f32>, // flattened: len = ids.len() * dimension
}

impl FlatL2Index {
    /// Create an empty index for vectors of `dimension` elements
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Append a vector under `id`
    pub fn add(&mut self, id: u64, vector: &[f32]) -> Result<()> {
        if self.dimension == 0 {
            return Err(SemanticError::ZeroDimension);
        }
        self.check_dimension(vector)?;
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// Remove every vector whose ID is in `ids`, returning how many were removed
    pub fn remove_ids(&mut self, ids: &[u64]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let dim = self.dimension;
        let mut kept_ids = Vec::with_capacity(self.ids.len());
        let mut kept_vectors = Vec::with_capacity(self.vectors.len());

        for (pos, &id) in self.ids.iter().enumerate() {
            if ids.contains(&id) {
                continue;
            }
            kept_ids.push(id);
            kept_vectors.extend_from_slice(&self.vectors[pos * dim..(pos + 1) * dim]);
        }

        let removed = self.ids.len() - kept_ids.len();
        self.ids = kept_ids;
        self.vectors = kept_vectors;
        removed
    }

    /// Search for the `k` nearest vectors to `query`
    ///
    /// Returns `(id, squared_distance)` pairs ordered by ascending distance.
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        self.check_dimension(query)?;
        if k == 0 || self.ids.is_empty() || self.dimension == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<(u64, f32)> = self
            .ids
            .iter()
            .zip(self.vectors.chunks_exact(self.dimension))
            .map(|(&id, stored)| (id, squared_l2(query, stored)))
            .collect();

        // Stable sort keeps ties in insertion order
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(k);

        Ok(results)
    }

    /// Get the stored vector for `id`
    pub fn get(&self, id: u64) -> Option<&[f32]> {
        let pos = self.ids.iter().position(|&stored| stored == id)?;
        Some(&self.vectors[pos * self.dimension..(pos + 1) * self.dimension])
    }

    /// IDs in insertion order
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Get number of indexed vectors
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Check that the flat buffer agrees with the ID list and dimension
    ///
    /// Used after deserializing an index from disk.
    pub fn is_well_formed(&self) -> bool {
        self.dimension > 0 && self.vectors.len() == self.ids.len() * self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

/// Squared Euclidean distance (no final square root)
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
