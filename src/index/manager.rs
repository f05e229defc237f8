use super::{
    FlatIndex, IndexEntry, IndexError, IndexMetadata, Retriever, VectorIndex, load_blocking,
    metadata::METADATA_FILE_NAME, save_blocking,
};
use crate::{document::Chunk, embedding::SharedEmbeddingClient};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Default number of texts sent to the embedding provider per request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// How [`VectorIndexManager::load_or_create`] obtained its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// An index already existed on disk.
    Loaded {
        /// Vectors in the loaded index.
        vectors: usize,
    },
    /// A new index was built from the seed chunks.
    Created {
        /// Distinct chunks embedded into the new index.
        seeded: usize,
    },
}

/// Owns one index directory: the vector index, its fingerprint ledger, and the embedder
/// used to fill it. Every chunk is added at most once per directory.
///
/// Callers sharing a directory across tasks must serialize mutation through
/// [`super::IndexLocks`].
pub struct VectorIndexManager<I: VectorIndex = FlatIndex> {
    dir: PathBuf,
    metadata_path: PathBuf,
    metadata: IndexMetadata,
    embedder: SharedEmbeddingClient,
    batch_size: usize,
    index: Option<Arc<I>>,
}

impl<I: VectorIndex> VectorIndexManager<I> {
    /// Bind a manager to `dir`, creating it and loading its fingerprint ledger.
    pub fn new(dir: impl Into<PathBuf>, embedder: SharedEmbeddingClient) -> Result<Self, IndexError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| IndexError::Io {
            path: dir.clone(),
            source,
        })?;
        let metadata_path = dir.join(METADATA_FILE_NAME);
        let metadata = IndexMetadata::load(&metadata_path);

        Ok(Self {
            dir,
            metadata_path,
            metadata,
            embedder,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            index: None,
        })
    }

    /// Override the embedding batch size (values below one are clamped to one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Directory this manager is bound to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fingerprint ledger as currently held in memory.
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Load the persisted index, or build one from `seed` when none exists.
    ///
    /// Seeded chunks are recorded in the ledger, so a following
    /// [`add_documents`](Self::add_documents) with the same chunks adds nothing.
    pub async fn load_or_create(&mut self, seed: &[Chunk]) -> Result<LoadOutcome, IndexError> {
        if I::exists(&self.dir) {
            let index: I = load_blocking(&self.dir).await?;
            let vectors = index.len();
            tracing::info!(index_dir = %self.dir.display(), vectors, "Loaded existing index");
            self.index = Some(Arc::new(index));
            return Ok(LoadOutcome::Loaded { vectors });
        }

        if !self.metadata.is_empty() {
            tracing::warn!(
                index_dir = %self.dir.display(),
                stale = self.metadata.len(),
                "Index files missing; discarding stale fingerprint ledger"
            );
            self.metadata = IndexMetadata::default();
        }

        let pending = self.pending(seed);
        if pending.is_empty() {
            return Err(IndexError::Empty(self.dir.clone()));
        }

        let entries = self.embed(pending, None).await?;
        let dimension = entries
            .first()
            .map(|entry| entry.vector.len())
            .unwrap_or_default();
        let seeded = entries.len();
        let fingerprints: Vec<String> = entries.iter().map(|e| e.fingerprint.clone()).collect();

        let index = Arc::new(I::from_entries(dimension, entries)?);
        save_blocking(Arc::clone(&index), &self.dir).await?;
        self.record(fingerprints)?;
        self.index = Some(index);

        tracing::info!(index_dir = %self.dir.display(), seeded, dimension, "Created new index");
        Ok(LoadOutcome::Created { seeded })
    }

    /// Embed and append every chunk whose fingerprint is not yet recorded.
    /// Returns the number of vectors added.
    pub async fn add_documents(&mut self, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let dimension = match &self.index {
            Some(index) => index.dimension(),
            None => return Err(IndexError::NotInitialized),
        };

        let pending = self.pending(chunks);
        if pending.is_empty() {
            tracing::info!(
                index_dir = %self.dir.display(),
                offered = chunks.len(),
                "No new chunks to add"
            );
            return Ok(0);
        }

        let entries = self.embed(pending, Some(dimension)).await?;
        let added = entries.len();
        let fingerprints: Vec<String> = entries.iter().map(|e| e.fingerprint.clone()).collect();

        let index = self.index.as_mut().ok_or(IndexError::NotInitialized)?;
        Arc::make_mut(index).add(entries)?;
        save_blocking(Arc::clone(index), &self.dir).await?;
        self.record(fingerprints)?;

        tracing::info!(
            index_dir = %self.dir.display(),
            added,
            skipped = chunks.len() - added,
            "Added chunks to index"
        );
        Ok(added)
    }

    /// A query handle over the current index snapshot.
    pub fn retriever(&self, k: usize) -> Result<Retriever<I>, IndexError> {
        let index = self.index.as_ref().ok_or(IndexError::NotInitialized)?;
        Ok(Retriever::new(
            Arc::clone(index),
            Arc::clone(&self.embedder),
            k,
        ))
    }

    /// Chunks not yet recorded, without duplicates or whitespace-only text, in input order.
    fn pending<'a>(&self, chunks: &'a [Chunk]) -> Vec<(String, &'a Chunk)> {
        let mut seen = HashSet::new();
        chunks
            .iter()
            .filter(|chunk| !chunk.text.trim().is_empty())
            .map(|chunk| (chunk.fingerprint(), chunk))
            .filter(|(fingerprint, _)| !self.metadata.contains(fingerprint))
            .filter(|(fingerprint, _)| seen.insert(fingerprint.clone()))
            .collect()
    }

    async fn embed(
        &self,
        pending: Vec<(String, &Chunk)>,
        dimension: Option<usize>,
    ) -> Result<Vec<IndexEntry>, IndexError> {
        let mut expected_dimension = dimension;
        let mut entries = Vec::with_capacity(pending.len());

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::EmbeddingCount {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for ((fingerprint, chunk), vector) in batch.iter().zip(vectors) {
                let expected = *expected_dimension.get_or_insert(vector.len());
                if vector.len() != expected || expected == 0 {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                entries.push(IndexEntry {
                    fingerprint: fingerprint.clone(),
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    vector,
                });
            }
        }

        Ok(entries)
    }

    fn record(&mut self, fingerprints: Vec<String>) -> Result<(), IndexError> {
        for fingerprint in fingerprints {
            self.metadata.mark(fingerprint);
        }
        self.metadata.save(&self.metadata_path)
    }
}
