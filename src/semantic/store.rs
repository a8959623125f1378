//! Persistent vector index store
//!
//! Pairs a [`FlatL2Index`] with the mapping from index IDs to file paths and
//! keeps both on disk as two artifacts sharing a path prefix:
//!
//! - `<prefix>.index`: [`PersistedVectorIndex`] (version, dimension, next ID, flat index)
//! - `<prefix>.mapping`: [`PersistedFileMapping`] (version, ID → path map)
//!
//! Both artifacts are rewritten in full on every save (index first, then
//! mapping), each through a temporary file renamed into place. An advisory
//! lock on `<prefix>.lock` keeps other processes from reading a half-written
//! pair. The store itself is single-writer; callers must serialize mutations.

use super::embeddings::Embedding;
use super::error::{Result, SemanticError};
use super::vector_index::FlatL2Index;
use fs2::FileExt;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INDEX_SUFFIX: &str = ".index";
const MAPPING_SUFFIX: &str = ".mapping";
const LOCK_SUFFIX: &str = ".lock";

/// When mutations are written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Every add/remove persists before returning
    #[default]
    Immediate,
    /// Mutations only mark the store dirty; call [`VectorIndexStore::flush`]
    Deferred,
}

/// On-disk layout of `<prefix>.index`
///
/// Generic over the index so saving can borrow it while loading owns it.
#[derive(Serialize, Deserialize)]
pub struct PersistedVectorIndex<I = FlatL2Index> {
    /// Format version, checked against [`VectorIndexStore::CURRENT_VERSION`]
    pub version: u32,
    /// Embedding dimension the index was built with
    pub dimension: usize,
    /// Next ID to hand out, so IDs stay unique across restarts
    pub next_id: u64,
    pub index: I,
}

/// On-disk layout of `<prefix>.mapping`
#[derive(Serialize, Deserialize)]
pub struct PersistedFileMapping<M = BTreeMap<u64, String>> {
    pub version: u32,
    /// Index ID → file path
    pub files: M,
}

/// State recovered from disk, before reconciliation
struct LoadedState {
    next_id: u64,
    index: FlatL2Index,
    files: BTreeMap<u64, String>,
}

/// Durable nearest-neighbor index over file embeddings
pub struct VectorIndexStore {
    path_prefix: PathBuf,
    index: FlatL2Index,
    file_mapping: BTreeMap<u64, String>,
    path_to_id: FxHashMap<String, u64>,
    next_id: u64,
    persist_mode: PersistMode,
    dirty: bool,
}

impl VectorIndexStore {
    /// Persistence format version (bump this when the artifact layout changes)
    pub const CURRENT_VERSION: u32 = 1;

    /// Open the store at `path_prefix`, or start empty
    ///
    /// Missing, unreadable, corrupt, or dimension-mismatched artifacts never
    /// fail construction: the problem is logged and the store starts empty.
    pub fn load_or_create(
        path_prefix: impl Into<PathBuf>,
        dimension: usize,
        persist_mode: PersistMode,
    ) -> Self {
        let path_prefix = path_prefix.into();
        let mut store = Self {
            index: FlatL2Index::new(dimension),
            file_mapping: BTreeMap::new(),
            path_to_id: FxHashMap::default(),
            next_id: 0,
            persist_mode,
            dirty: false,
            path_prefix,
        };

        let index_path = store.index_path();
        let mapping_path = store.mapping_path();
        if !index_path.exists() && !mapping_path.exists() {
            info!(
                path = %store.path_prefix.display(),
                dimension,
                "No persisted index found, starting with an empty index"
            );
            return store;
        }

        match load_artifacts(&store.path_prefix, dimension) {
            Ok(loaded) => {
                store.restore(loaded);
                info!(
                    path = %store.path_prefix.display(),
                    files = store.file_mapping.len(),
                    "Loaded persisted index"
                );
            }
            Err(e) => {
                warn!(
                    path = %store.path_prefix.display(),
                    error = %e,
                    "Failed to load persisted index, starting with an empty index"
                );
            }
        }

        store
    }

    /// Add vectors and their file paths
    ///
    /// Empty or length-mismatched inputs are ignored. A path that is already
    /// indexed is replaced; within one call the last occurrence of a path wins.
    pub fn add_vectors<S: AsRef<str>>(&mut self, vectors: &[Embedding], file_paths: &[S]) -> Result<()> {
        if vectors.is_empty() || vectors.len() != file_paths.len() {
            debug!(
                vectors = vectors.len(),
                paths = file_paths.len(),
                "Ignoring add with empty or mismatched inputs"
            );
            return Ok(());
        }

        let dimension = self.dimension();
        if dimension == 0 {
            return Err(SemanticError::ZeroDimension);
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(SemanticError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }
        if vectors.iter().any(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(SemanticError::Embedding(
                "embedding contains a non-finite value".into(),
            ));
        }

        let mut replaced = Vec::new();
        for (vector, path) in vectors.iter().zip(file_paths) {
            let path = path.as_ref();
            if let Some(old_id) = self.path_to_id.remove(path) {
                self.file_mapping.remove(&old_id);
                replaced.push(old_id);
            }

            let id = self.next_id;
            self.next_id += 1;
            self.index.add(id, vector)?;
            self.file_mapping.insert(id, path.to_string());
            self.path_to_id.insert(path.to_string(), id);
        }

        if !replaced.is_empty() {
            debug!(replaced = replaced.len(), "Replaced previously indexed files");
            self.index.remove_ids(&replaced);
        }

        self.after_mutation()
    }

    /// Find the `k` files closest to `query`
    ///
    /// Returns `(path, squared_l2_distance)` pairs, best match first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let neighbors = self.index.search(query, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|(id, distance)| {
                self.file_mapping
                    .get(&id)
                    .map(|path| (path.clone(), distance))
            })
            .collect())
    }

    /// Remove a file's entry, returning whether anything was removed
    pub fn remove_file(&mut self, file_path: &str) -> Result<bool> {
        let Some(id) = self.path_to_id.remove(file_path) else {
            debug!(path = file_path, "File not indexed, nothing to remove");
            return Ok(false);
        };

        self.index.remove_ids(&[id]);
        self.file_mapping.remove(&id);
        self.after_mutation()?;

        Ok(true)
    }

    /// Number of searchable files
    pub fn get_total_files(&self) -> usize {
        self.file_mapping.len()
    }

    pub fn contains(&self, file_path: &str) -> bool {
        self.path_to_id.contains_key(file_path)
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn path_prefix(&self) -> &Path {
        &self.path_prefix
    }

    pub fn persist_mode(&self) -> PersistMode {
        self.persist_mode
    }

    /// True when in-memory state has not been written to disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn index_path(&self) -> PathBuf {
        artifact_path(&self.path_prefix, INDEX_SUFFIX)
    }

    pub fn mapping_path(&self) -> PathBuf {
        artifact_path(&self.path_prefix, MAPPING_SUFFIX)
    }

    /// Write pending changes, if any
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }

    /// Write both artifacts unconditionally
    pub fn save(&mut self) -> Result<()> {
        let dir = parent_dir(&self.path_prefix);
        std::fs::create_dir_all(&dir).map_err(|e| SemanticError::persist(&dir, e))?;

        let lock_path = artifact_path(&self.path_prefix, LOCK_SUFFIX);
        let lock = open_lock_file(&lock_path).map_err(|e| SemanticError::persist(&lock_path, e))?;
        lock.lock_exclusive()
            .map_err(|e| SemanticError::persist(&lock_path, e))?;

        let persisted_index = PersistedVectorIndex {
            version: Self::CURRENT_VERSION,
            dimension: self.index.dimension(),
            next_id: self.next_id,
            index: &self.index,
        };
        write_artifact(&dir, &self.index_path(), &persisted_index)?;

        let persisted_mapping = PersistedFileMapping {
            version: Self::CURRENT_VERSION,
            files: &self.file_mapping,
        };
        write_artifact(&dir, &self.mapping_path(), &persisted_mapping)?;

        // Lock is released when `lock` is dropped
        self.dirty = false;
        debug!(
            path = %self.path_prefix.display(),
            files = self.file_mapping.len(),
            "Persisted index"
        );

        Ok(())
    }

    fn after_mutation(&mut self) -> Result<()> {
        self.dirty = true;
        match self.persist_mode {
            PersistMode::Immediate => self.save(),
            PersistMode::Deferred => Ok(()),
        }
    }

    /// Adopt loaded state, repairing any disagreement between index and mapping
    fn restore(&mut self, loaded: LoadedState) {
        let LoadedState {
            next_id,
            mut index,
            mut files,
        } = loaded;

        let index_ids: FxHashSet<u64> = index.ids().iter().copied().collect();

        let orphan_vectors: Vec<u64> = index
            .ids()
            .iter()
            .copied()
            .filter(|id| !files.contains_key(id))
            .collect();
        let orphan_mappings: Vec<u64> = files
            .keys()
            .copied()
            .filter(|id| !index_ids.contains(id))
            .collect();

        for id in &orphan_mappings {
            files.remove(id);
        }

        // Keep only the newest ID for a path indexed more than once
        let mut path_to_id: FxHashMap<String, u64> = FxHashMap::default();
        let mut duplicates = Vec::new();
        for (&id, path) in &files {
            if let Some(older) = path_to_id.insert(path.clone(), id) {
                duplicates.push(older);
            }
        }
        for id in &duplicates {
            files.remove(id);
        }

        let mut dropped_vectors = orphan_vectors;
        dropped_vectors.extend_from_slice(&duplicates);
        index.remove_ids(&dropped_vectors);

        if !dropped_vectors.is_empty() || !orphan_mappings.is_empty() {
            warn!(
                path = %self.path_prefix.display(),
                dropped_vectors = dropped_vectors.len(),
                dropped_mappings = orphan_mappings.len(),
                "Persisted index and file mapping disagreed, dropped unmatched entries"
            );
        }

        let max_id = index.ids().iter().copied().max();
        self.next_id = max_id.map_or(next_id, |max| next_id.max(max + 1));
        self.index = index;
        self.file_mapping = files;
        self.path_to_id = path_to_id;
        self.dirty = false;
    }
}

/// `<prefix><suffix>`, appended rather than replacing any extension on the prefix
fn artifact_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn parent_dir(prefix: &Path) -> PathBuf {
    match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Serialize `value` into a temp file in `dir`, then rename it over `target`
fn write_artifact<T: Serialize>(dir: &Path, target: &Path, value: &T) -> Result<()> {
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SemanticError::persist(target, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        bincode::serialize_into(&mut writer, value).map_err(|e| SemanticError::persist(target, e))?;
        writer.flush().map_err(|e| SemanticError::persist(target, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| SemanticError::persist(target, e))?;

    tmp.persist(target)
        .map_err(|e| SemanticError::persist(target, e))?;

    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(SemanticError::load(path, "file is missing"));
    }
    std::fs::read(path).map_err(|e| SemanticError::load(path, e))
}

fn load_artifacts(prefix: &Path, dimension: usize) -> Result<LoadedState> {
    let index_path = artifact_path(prefix, INDEX_SUFFIX);
    let mapping_path = artifact_path(prefix, MAPPING_SUFFIX);

    // Shared lock so a concurrent save cannot interleave with our reads.
    // A lock that cannot be taken (e.g. read-only directory) is not fatal.
    let lock_path = artifact_path(prefix, LOCK_SUFFIX);
    let _lock = match open_lock_file(&lock_path).and_then(|f| f.lock_shared().map(|_| f)) {
        Ok(file) => Some(file),
        Err(e) => {
            debug!(path = %lock_path.display(), error = %e, "Reading index without lock");
            None
        }
    };

    let index_bytes = read_artifact(&index_path)?;
    let mapping_bytes = read_artifact(&mapping_path)?;

    let PersistedVectorIndex {
        version,
        dimension: stored_dimension,
        next_id,
        index,
    }: PersistedVectorIndex =
        bincode::deserialize(&index_bytes).map_err(|e| SemanticError::load(&index_path, e))?;
    check_version(&index_path, version)?;

    if stored_dimension != dimension || index.dimension() != dimension {
        return Err(SemanticError::load(
            &index_path,
            format!(
                "dimension mismatch: index has {}, expected {}",
                stored_dimension, dimension
            ),
        ));
    }
    if !index.is_well_formed() {
        return Err(SemanticError::load(&index_path, "vector buffer does not match ID count"));
    }
    let unique_ids: FxHashSet<u64> = index.ids().iter().copied().collect();
    if unique_ids.len() != index.len() {
        return Err(SemanticError::load(&index_path, "duplicate vector IDs"));
    }

    let PersistedFileMapping { version, files }: PersistedFileMapping =
        bincode::deserialize(&mapping_bytes).map_err(|e| SemanticError::load(&mapping_path, e))?;
    check_version(&mapping_path, version)?;

    Ok(LoadedState {
        next_id,
        index,
        files,
    })
}

fn check_version(path: &Path, version: u32) -> Result<()> {
    if version != VectorIndexStore::CURRENT_VERSION {
        return Err(SemanticError::load(
            path,
            format!(
                "format version mismatch: found {}, expected {}",
                version,
                VectorIndexStore::CURRENT_VERSION
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, dimension: usize) -> VectorIndexStore {
        VectorIndexStore::load_or_create(dir.path().join("search_index"), dimension, PersistMode::Immediate)
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir, 2);

        assert_eq!(store.get_total_files(), 0);
        assert!(store.search(&[1.0, 0.0], 5).unwrap().is_empty());
        assert!(!store.is_dirty());
        assert!(!store.index_path().exists());
    }

    #[test]
    fn test_round_trip_self_distance_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let v = vec![0.25, -0.5, 1.0];

        {
            let mut store = open(&temp_dir, 3);
            store.add_vectors(&[v.clone()], &["a.txt"]).unwrap();
            assert!(store.index_path().exists());
            assert!(store.mapping_path().exists());
        }

        let store = open(&temp_dir, 3);
        assert_eq!(store.get_total_files(), 1);
        let results = store.search(&v, 1).unwrap();
        assert_eq!(results, vec![("a.txt".to_string(), 0.0)]);
    }

    #[test]
    fn test_toy_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);
        store
            .add_vectors(
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
                &["first.txt", "second.txt", "third.txt"],
            )
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(
            results,
            vec![("first.txt".to_string(), 0.0), ("third.txt".to_string(), 1.0)]
        );

        let all = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], ("second.txt".to_string(), 2.0));
    }

    #[test]
    fn test_empty_and_mismatched_adds_are_noops() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        let no_paths: [&str; 0] = [];
        store.add_vectors(&[], &no_paths).unwrap();
        store.add_vectors(&[vec![1.0, 0.0]], &no_paths).unwrap();
        store
            .add_vectors(&[vec![1.0, 0.0]], &["a.txt", "b.txt"])
            .unwrap();

        assert_eq!(store.get_total_files(), 0);
        assert!(!store.is_dirty());
        assert!(!store.index_path().exists());
    }

    #[test]
    fn test_wrong_dimension_is_rejected_before_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 3);

        let err = store
            .add_vectors(&[vec![1.0, 0.0, 0.0], vec![1.0]], &["ok.txt", "bad.txt"])
            .unwrap_err();
        assert!(matches!(
            err,
            SemanticError::DimensionMismatch { expected: 3, got: 1 }
        ));
        assert_eq!(store.get_total_files(), 0);

        store.add_vectors(&[vec![1.0, 0.0, 0.0]], &["ok.txt"]).unwrap();
        assert!(store.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_non_finite_vector_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        let err = store
            .add_vectors(&[vec![f32::INFINITY, 0.0]], &["inf.txt"])
            .unwrap_err();
        assert!(matches!(err, SemanticError::Embedding(_)));
        assert!(store.add_vectors(&[vec![f32::NAN, 0.0]], &["nan.txt"]).is_err());
        assert_eq!(store.get_total_files(), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_artifacts_record_version_and_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);
        store
            .add_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["a.txt", "b.txt"])
            .unwrap();
        store.remove_file("a.txt").unwrap();

        let bytes = std::fs::read(store.index_path()).unwrap();
        let persisted: PersistedVectorIndex = bincode::deserialize(&bytes).unwrap();
        assert_eq!(persisted.version, VectorIndexStore::CURRENT_VERSION);
        assert_eq!(persisted.dimension, 2);
        assert_eq!(persisted.next_id, 2);
        assert_eq!(persisted.index.ids(), &[1]);

        let bytes = std::fs::read(store.mapping_path()).unwrap();
        let mapping: PersistedFileMapping = bincode::deserialize(&bytes).unwrap();
        assert_eq!(mapping.files.get(&1).map(String::as_str), Some("b.txt"));
        assert_eq!(mapping.files.len(), 1);
    }

    #[test]
    fn test_reindex_replaces_previous_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        store.add_vectors(&[vec![1.0, 0.0]], &["doc.txt"]).unwrap();
        store.add_vectors(&[vec![0.0, 1.0]], &["doc.txt"]).unwrap();

        assert_eq!(store.get_total_files(), 1);
        let results = store.search(&[0.0, 1.0], 10).unwrap();
        assert_eq!(results, vec![("doc.txt".to_string(), 0.0)]);
    }

    #[test]
    fn test_duplicate_path_in_one_batch_keeps_last() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);

        store
            .add_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["doc.txt", "doc.txt"])
            .unwrap();

        assert_eq!(store.get_total_files(), 1);
        let results = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results, vec![("doc.txt".to_string(), 2.0)]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir, 2);
        store
            .add_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["a.txt", "b.txt"])
            .unwrap();

        assert!(store.remove_file("a.txt").unwrap());
        assert!(!store.remove_file("a.txt").unwrap());
        assert!(!store.remove_file("never-indexed.txt").unwrap());

        assert_eq!(store.get_total_files(), 1);
        assert!(!store.contains("a.txt"));
        let results = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b.txt");

        let reopened = open(&temp_dir, 2);
        assert_eq!(reopened.get_total_files(), 1);
    }

    #[test]
    fn test_ids_are_not_reused_after_remove_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir, 2);
            store
                .add_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["a.txt", "b.txt"])
                .unwrap();
            store.remove_file("b.txt").unwrap();
        }

        let mut store = open(&temp_dir, 2);
        store.add_vectors(&[vec![5.0, 5.0]], &["c.txt"]).unwrap();

        assert_eq!(store.next_id, 3);
        assert_eq!(store.index.ids(), &[0, 2]);
        assert_eq!(store.get_total_files(), 2);
    }

    #[test]
    fn test_corrupt_index_falls_back_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir, 2);
            store.add_vectors(&[vec![1.0, 0.0]], &["a.txt"]).unwrap();
        }
        let store = open(&temp_dir, 2);
        std::fs::write(store.index_path(), b"garbage").unwrap();

        let store = open(&temp_dir, 2);
        assert_eq!(store.get_total_files(), 0);
        assert!(store.search(&[1.0, 0.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_missing_mapping_falls_back_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mapping_path = {
            let mut store = open(&temp_dir, 2);
            store.add_vectors(&[vec![1.0, 0.0]], &["a.txt"]).unwrap();
            store.mapping_path()
        };
        std::fs::remove_file(mapping_path).unwrap();

        let store = open(&temp_dir, 2);
        assert_eq!(store.get_total_files(), 0);
    }

    #[test]
    fn test_dimension_mismatched_artifacts_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir, 2);
            store.add_vectors(&[vec![1.0, 0.0]], &["a.txt"]).unwrap();
        }

        let mut store = open(&temp_dir, 3);
        assert_eq!(store.get_total_files(), 0);
        assert_eq!(store.dimension(), 3);

        // The fresh store is usable and overwrites the stale artifacts
        store.add_vectors(&[vec![0.0, 0.0, 1.0]], &["b.txt"]).unwrap();
        let reopened = open(&temp_dir, 3);
        assert_eq!(reopened.get_total_files(), 1);
    }

    #[test]
    fn test_stale_mapping_is_reconciled() {
        let temp_dir = TempDir::new().unwrap();
        let (mapping_path, stale_mapping) = {
            let mut store = open(&temp_dir, 2);
            store
                .add_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["a.txt", "b.txt"])
                .unwrap();
            let stale = std::fs::read(store.mapping_path()).unwrap();

            store.remove_file("a.txt").unwrap();
            store.add_vectors(&[vec![1.0, 1.0]], &["c.txt"]).unwrap();
            (store.mapping_path(), stale)
        };

        // Simulate a crash after the index blob was written but before the mapping
        std::fs::write(&mapping_path, stale_mapping).unwrap();

        let store = open(&temp_dir, 2);
        assert_eq!(store.get_total_files(), 1);
        assert!(store.contains("b.txt"));
        assert!(!store.contains("a.txt"));
        assert!(!store.contains("c.txt"));
        assert_eq!(store.index.len(), 1);
        assert_eq!(store.next_id, 3);
    }

    #[test]
    fn test_prefix_with_dots_keeps_its_name() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = temp_dir.path().join("files.v1");
        let mut store = VectorIndexStore::load_or_create(&prefix, 2, PersistMode::Immediate);
        store.add_vectors(&[vec![1.0, 0.0]], &["a.txt"]).unwrap();

        assert!(temp_dir.path().join("files.v1.index").exists());
        assert!(temp_dir.path().join("files.v1.mapping").exists());
    }

    #[test]
    fn test_deferred_mode_writes_on_flush() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = temp_dir.path().join("search_index");
        let mut store = VectorIndexStore::load_or_create(&prefix, 2, PersistMode::Deferred);

        store.add_vectors(&[vec![1.0, 0.0]], &["a.txt"]).unwrap();
        assert!(store.is_dirty());
        assert!(!store.index_path().exists());

        store.flush().unwrap();
        assert!(!store.is_dirty());

        let reopened = VectorIndexStore::load_or_create(&prefix, 2, PersistMode::Deferred);
        assert_eq!(reopened.get_total_files(), 1);
    }

    #[test]
    fn test_persist_failure_is_reported_and_leaves_store_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut store =
            VectorIndexStore::load_or_create(blocker.join("search_index"), 2, PersistMode::Immediate);
        let err = store
            .add_vectors(&[vec![1.0, 0.0]], &["a.txt"])
            .unwrap_err();

        assert!(matches!(err, SemanticError::IndexPersist { .. }));
        assert!(store.is_dirty());
        // In-memory state keeps the mutation
        assert_eq!(store.get_total_files(), 1);
    }
}
