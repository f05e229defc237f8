use super::{FlatIndex, IndexError, SearchHit, VectorIndex, load_blocking};
use crate::embedding::SharedEmbeddingClient;
use std::{path::Path, sync::Arc};

/// Query handle over an index snapshot, returning at most `k` hits per query.
pub struct Retriever<I: VectorIndex = FlatIndex> {
    index: Arc<I>,
    embedder: SharedEmbeddingClient,
    k: usize,
}

impl<I: VectorIndex> Clone for Retriever<I> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            embedder: Arc::clone(&self.embedder),
            k: self.k,
        }
    }
}

impl<I: VectorIndex> Retriever<I> {
    pub(crate) fn new(index: Arc<I>, embedder: SharedEmbeddingClient, k: usize) -> Self {
        Self { index, embedder, k }
    }

    /// Open the index persisted in `dir` for querying.
    ///
    /// Callers sharing the directory with writers should hold
    /// [`super::IndexLocks::acquire_read`] while this runs.
    pub async fn load(
        dir: &Path,
        embedder: SharedEmbeddingClient,
        k: usize,
    ) -> Result<Self, IndexError> {
        if !I::exists(dir) {
            return Err(IndexError::Empty(dir.to_path_buf()));
        }
        let index: I = load_blocking(dir).await?;
        Ok(Self::new(Arc::new(index), embedder, k))
    }

    /// Embed `query` and return the closest chunks, best first.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IndexError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        if vectors.len() != 1 {
            return Err(IndexError::EmbeddingCount {
                expected: 1,
                actual: vectors.len(),
            });
        }
        let vector = vectors.remove(0);
        if vector.len() != self.index.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: vector.len(),
            });
        }

        let hits = self.index.search(&vector, self.k);
        tracing::debug!(k = self.k, hits = hits.len(), "Retriever search completed");
        Ok(hits)
    }

    /// Configured number of hits.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Vectors in the underlying snapshot.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
