//! Persistent, deduplicated vector indexes stored one per directory.

pub mod fingerprint;
mod flat;
mod locks;
mod manager;
pub mod metadata;
mod retriever;

use crate::{document::Metadata, embedding::EmbeddingClientError};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

pub use flat::FlatIndex;
pub use locks::IndexLocks;
pub use manager::{LoadOutcome, VectorIndexManager};
pub use metadata::IndexMetadata;
pub use retriever::Retriever;

/// Errors raised by index persistence and the index manager.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No index exists yet and there is nothing to seed one with.
    #[error("No index found in {0} and no documents to create one from")]
    Empty(PathBuf),
    /// `add_documents` or `retriever` was called before `load_or_create`.
    #[error("Index not initialized; call load_or_create first")]
    NotInitialized,
    /// Reading or writing index files failed.
    #[error("Index IO failure at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// An index file held invalid JSON.
    #[error("Malformed index file {path}: {source}")]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Vector and docstore files disagree on the number of entries.
    #[error("Index at {path} holds {vectors} vectors but {entries} docstore entries")]
    Inconsistent {
        /// Index directory.
        path: PathBuf,
        /// Vectors in `index.json`.
        vectors: usize,
        /// Entries in `docstore.json`.
        entries: usize,
    },
    /// The embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The provider returned a different number of vectors than texts sent.
    #[error("Embedding provider returned {actual} vectors for {expected} texts")]
    EmbeddingCount {
        /// Texts sent.
        expected: usize,
        /// Vectors received.
        actual: usize,
    },
    /// A blocking index read or write panicked or was cancelled.
    #[error("Index file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// A vector does not match the index dimensionality.
    #[error("Vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch {
        /// Index dimensionality.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },
}

/// One stored vector with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Chunk identity.
    pub fingerprint: String,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: Metadata,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: Metadata,
    /// Cosine similarity to the query; higher is closer.
    pub score: f32,
}

/// Storage and similarity search over embedded chunks.
///
/// Implementations persist themselves into a directory they share with the
/// [`IndexMetadata`] file; they never look at fingerprints for dedup purposes.
pub trait VectorIndex: Clone + Send + Sync + 'static {
    /// Whether `dir` contains a persisted index.
    fn exists(dir: &Path) -> bool;

    /// Build a new index from entries whose vectors all have `dimension` components.
    fn from_entries(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self, IndexError>;

    /// Load a persisted index from `dir`.
    fn load_local(dir: &Path) -> Result<Self, IndexError>;

    /// Append entries.
    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), IndexError>;

    /// Persist the full index into `dir`.
    fn save_local(&self, dir: &Path) -> Result<(), IndexError>;

    /// Top `k` entries by descending similarity to `query`.
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimensionality.
    fn dimension(&self) -> usize;
}

/// Load the index persisted in `dir` on the blocking pool.
pub(crate) async fn load_blocking<I: VectorIndex>(dir: &Path) -> Result<I, IndexError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || I::load_local(&dir)).await?
}

/// Persist `index` into `dir` on the blocking pool.
pub(crate) async fn save_blocking<I: VectorIndex>(index: Arc<I>, dir: &Path) -> Result<(), IndexError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || index.save_local(&dir)).await?
}

/// Serialize `value` as compact JSON into a sibling temp file, then rename it over `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let payload = serde_json::to_vec(value).map_err(|source| IndexError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::new_v4().simple()
    ));

    std::fs::write(&tmp, payload).map_err(|source| IndexError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        IndexError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let raw = std::fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| IndexError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("value.json");
        write_json_atomic(&path, &serde_json::json!({ "a": 1 })).expect("first");
        write_json_atomic(&path, &serde_json::json!({ "a": 2 })).expect("second");

        let value: serde_json::Value = read_json(&path).expect("read");
        assert_eq!(value["a"], 2);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn vectors_are_written_on_one_line() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("vectors.json");
        let vectors = vec![vec![0.25_f32; 768]; 3];
        write_json_atomic(&path, &vectors).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(raw.lines().count(), 1);
        let back: Vec<Vec<f32>> = read_json(&path).expect("parse");
        assert_eq!(back, vectors);
    }

    #[tokio::test]
    async fn blocking_helpers_round_trip_an_index() {
        let dir = TempDir::new().expect("tempdir");
        let entry = IndexEntry {
            fingerprint: "fp".into(),
            text: "text".into(),
            metadata: Metadata::new(),
            vector: vec![1.0, 0.0],
        };
        let index = Arc::new(FlatIndex::from_entries(2, vec![entry]).expect("index"));
        save_blocking(index, dir.path()).await.expect("save");

        let loaded: FlatIndex = load_blocking(dir.path()).await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dimension(), 2);
    }

    #[test]
    fn read_json_reports_malformed_files() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").expect("write");
        let error = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(error, IndexError::Malformed { .. }));
    }
}
