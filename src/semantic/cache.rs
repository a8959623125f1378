//! Query embedding cache
//!
//! Repeated searches for the same text skip the embedding backend. Keys are
//! the trimmed query text. LRU eviction keeps memory bounded.

use super::embeddings::Embedding;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// LRU cache from query text to its embedding
pub struct QueryCache {
    cache: FxHashMap<String, Embedding>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    /// Create a new cache with given capacity (0 disables caching)
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Get cached embedding for a query
    pub fn get(&mut self, query: &str) -> Option<&Embedding> {
        let key = query.trim();
        if self.cache.contains_key(key) {
            self.hits += 1;
            self.touch(key);
            self.cache.get(key)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert a query embedding
    pub fn insert(&mut self, query: &str, embedding: Embedding) {
        if self.capacity == 0 {
            return;
        }

        let key = query.trim();
        if self.cache.contains_key(key) {
            self.order.retain(|k| k != key);
        } else if self.cache.len() >= self.capacity {
            if let Some(old_key) = self.order.pop_front() {
                self.cache.remove(&old_key);
            }
        }

        self.cache.insert(key.to_string(), embedding);
        self.order.push_back(key.to_string());
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    /// Get the number of cached queries
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_keys_share_an_entry() {
        let mut cache = QueryCache::new(3);
        cache.insert("  tax documents ", vec![1.0, 0.0]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("tax documents"), Some(&vec![1.0, 0.0]));
        assert!(cache.get("tax").is_none());
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = QueryCache::new(2);
        cache.insert("query1", vec![1.0, 0.0]);
        cache.insert("query2", vec![0.0, 1.0]);

        // Touch query1 so query2 becomes least recently used
        let _ = cache.get("query1");
        cache.insert("query3", vec![1.0, 1.0]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("query1").is_some());
        assert!(cache.get("query2").is_none());
        assert!(cache.get("query3").is_some());
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = QueryCache::new(0);
        cache.insert("query", vec![1.0]);
        assert!(cache.is_empty());
        assert!(cache.get("query").is_none());
    }

    #[test]
    fn test_reinsert_replaces_value() {
        let mut cache = QueryCache::new(2);
        cache.insert("query", vec![1.0]);
        cache.insert("query", vec![2.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("query"), Some(&vec![2.0]));

        cache.clear();
        assert!(cache.is_empty());
    }
}
