//! Options, outcomes, and error definitions for the ingestion pipeline.

use crate::{
    chunking::{ChunkingError, ChunkingOptions},
    config::Config,
    extract::ExtractError,
    index::{IndexError, Retriever, SearchHit},
    session::SessionError,
    storage::FileStoreError,
};
use serde::Serialize;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Pipeline stage that was running when an ingestion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    /// Writing uploads to the session directory.
    SaveFiles,
    /// Turning stored files into text.
    ExtractText,
    /// Splitting text into chunks.
    Chunk,
    /// Loading or creating the index and adding chunks.
    Index,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SaveFiles => "save_files",
            Self::ExtractText => "extract_text",
            Self::Chunk => "chunk",
            Self::Index => "index",
        };
        f.write_str(label)
    }
}

/// Progress of one ingestion run, logged as the pipeline advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Session resolved, nothing written yet.
    Created,
    /// Uploads stored on disk.
    FilesSaved,
    /// Text extracted from every stored file.
    TextExtracted,
    /// Documents split into chunks.
    Chunked,
    /// Chunks present in the index.
    Indexed,
    /// Retriever handed back to the caller.
    Ready,
    /// A stage failed; the run stops here.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::FilesSaved => "files_saved",
            Self::TextExtracted => "text_extracted",
            Self::Chunked => "chunked",
            Self::Indexed => "indexed",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Underlying cause of an ingestion failure.
#[derive(Debug, Error)]
pub enum IngestFailure {
    /// Caller supplied an unusable session id.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Uploads could not be written.
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    /// Every upload was filtered out or yielded no text.
    #[error("No valid files to ingest")]
    NoValidFiles,
    /// A stored file could not be turned into text.
    #[error("Failed to extract text from '{file}': {source}")]
    Extraction {
        /// Name the file was uploaded under.
        file: String,
        /// Extractor error.
        #[source]
        source: ExtractError,
    },
    /// Chunk parameters were rejected.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Index load, creation, or update failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    TaskJoin(String),
}

/// Ingestion failure tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("Ingestion failed during {stage}: {source}")]
pub struct IngestError {
    /// Stage that failed.
    pub stage: IngestStage,
    /// Cause.
    #[source]
    pub source: IngestFailure,
}

impl IngestError {
    /// Tag `source` with `stage`.
    pub fn new(stage: IngestStage, source: impl Into<IngestFailure>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Errors raised while answering a retrieval query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The question was blank.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// Sessioned indexes require the caller to name the session.
    #[error("session_id is required when use_session_dirs is enabled")]
    MissingSession,
    /// Caller supplied an unusable session id.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// No index has been built in the resolved directory.
    #[error("No index found at {0}")]
    IndexNotFound(PathBuf),
    /// Loading or searching the index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Per-run ingestion parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Session to ingest into; a new one is generated when absent.
    pub session_id: Option<String>,
    /// Give each session its own upload and index directory.
    pub use_session_dirs: bool,
    /// Chunk sizing.
    pub chunking: ChunkingOptions,
    /// Hits returned by the resulting retriever.
    pub k: usize,
}

impl IngestOptions {
    /// Defaults taken from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_id: None,
            use_session_dirs: config.use_session_dirs,
            chunking: ChunkingOptions {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
            },
            k: config.retriever_k,
        }
    }
}

/// Per-query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Session whose index is queried; required when `use_session_dirs` is set.
    pub session_id: Option<String>,
    /// Whether indexes live in per-session directories.
    pub use_session_dirs: bool,
    /// Maximum hits.
    pub k: usize,
}

impl QueryOptions {
    /// Defaults taken from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_id: None,
            use_session_dirs: config.use_session_dirs,
            k: config.retriever_k,
        }
    }
}

/// Serializable description of a finished ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Session the run belonged to.
    pub session_id: String,
    /// Whether the run used per-session directories.
    pub use_session_dirs: bool,
    /// Directory holding the stored uploads.
    pub upload_dir: PathBuf,
    /// Directory holding the index.
    pub index_dir: PathBuf,
    /// Uploads kept after extension filtering.
    pub files_saved: usize,
    /// Chunks produced by splitting.
    pub chunks: usize,
    /// Vectors written while creating a new index.
    pub seeded: usize,
    /// Vectors appended to an existing index.
    pub added: usize,
    /// Retriever hit count.
    pub k: usize,
}

impl IngestSummary {
    /// Vectors written by this run.
    pub fn indexed(&self) -> usize {
        self.seeded + self.added
    }
}

/// Result of [`super::IngestionService::build_retriever`].
pub struct IngestOutcome {
    /// Run statistics.
    pub summary: IngestSummary,
    /// Query handle over the updated index.
    pub retriever: Retriever,
}

/// Hits for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    /// Session that was queried, if any.
    pub session_id: Option<String>,
    /// Maximum hits requested.
    pub k: usize,
    /// Ranked hits, best first.
    pub hits: Vec<SearchHit>,
}
