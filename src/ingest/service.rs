use super::types::{
    IngestError, IngestFailure, IngestOptions, IngestOutcome, IngestStage, IngestSummary,
    PipelineState, QueryAnswer, QueryError, QueryOptions,
};
use crate::{
    chunking::split_documents,
    config::Config,
    document::{Document, Metadata},
    embedding::{EmbeddingClientError, SharedEmbeddingClient, get_embedding_client},
    extract::ExtractorRegistry,
    index::{FlatIndex, IndexLocks, LoadOutcome, Retriever, VectorIndex, VectorIndexManager},
    metrics::{IngestMetrics, MetricsSnapshot},
    session::{SessionId, resolve_dir},
    storage::{FileStore, StoredFile, UploadedFile},
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Runs uploads through save, extract, chunk, and index, and serves queries against the
/// resulting indexes.
///
/// Build one per process and share it behind an `Arc`; the per-directory writer locks only
/// serialize ingestions that go through the same service.
pub struct IngestionService {
    config: Arc<Config>,
    file_store: FileStore,
    extractors: Arc<ExtractorRegistry>,
    embedder: SharedEmbeddingClient,
    locks: IndexLocks,
    metrics: Arc<IngestMetrics>,
}

/// Surface consumed by the HTTP layer.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Ingestion parameters used when the request leaves them out.
    fn default_ingest_options(&self) -> IngestOptions;

    /// Query parameters used when the request leaves them out.
    fn default_query_options(&self) -> QueryOptions;

    /// Store, extract, chunk, and index `files`.
    async fn ingest(
        &self,
        files: Vec<UploadedFile>,
        options: IngestOptions,
    ) -> Result<IngestSummary, IngestError>;

    /// Retrieve the chunks closest to `question`.
    async fn query(&self, question: &str, options: QueryOptions)
    -> Result<QueryAnswer, QueryError>;

    /// Current ingestion counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl IngestionService {
    /// Build a service using the embedding provider named in `config`.
    pub fn new(config: Arc<Config>) -> Result<Self, EmbeddingClientError> {
        let embedder = get_embedding_client(&config)?;
        Ok(Self::with_embedder(config, embedder))
    }

    /// Build a service around an existing embedding client.
    pub fn with_embedder(config: Arc<Config>, embedder: SharedEmbeddingClient) -> Self {
        Self {
            file_store: FileStore::new().with_markdown(config.allow_markdown),
            config,
            extractors: Arc::new(ExtractorRegistry::new()),
            embedder,
            locks: IndexLocks::new(),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Ingest `files` and return a retriever over the updated index.
    pub async fn build_retriever(
        &self,
        files: Vec<UploadedFile>,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        let session = match SessionId::parse_or_generate(options.session_id.as_deref()) {
            Ok(session) => session,
            Err(error) => {
                let error = IngestError::new(IngestStage::SaveFiles, error);
                tracing::warn!(
                    state = %PipelineState::Failed,
                    stage = %error.stage,
                    error = %error.source,
                    "Ingestion rejected"
                );
                return Err(error);
            }
        };

        let result = self.run_pipeline(session.clone(), files, options).await;
        if let Err(error) = &result {
            self.metrics.record_failure();
            tracing::warn!(
                session_id = %session,
                state = %PipelineState::Failed,
                stage = %error.stage,
                error = %error.source,
                "Ingestion failed"
            );
        }
        result
    }

    async fn run_pipeline(
        &self,
        session: SessionId,
        files: Vec<UploadedFile>,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        let upload_dir = resolve_dir(
            &self.config.upload_base_dir,
            &session,
            options.use_session_dirs,
        );
        let index_dir = resolve_dir(
            &self.config.index_base_dir,
            &session,
            options.use_session_dirs,
        );
        log_state(&session, PipelineState::Created);

        let saved = self
            .file_store
            .save(files, &upload_dir)
            .await
            .map_err(|error| IngestError::new(IngestStage::SaveFiles, error))?;
        let stored = saved.files;
        if stored.is_empty() {
            tracing::warn!(
                session_id = %session,
                skipped = saved.skipped.len(),
                "No supported files in upload"
            );
            return Err(IngestError::new(
                IngestStage::SaveFiles,
                IngestFailure::NoValidFiles,
            ));
        }
        let files_saved = stored.len();
        log_state(&session, PipelineState::FilesSaved);

        let documents = self.extract_all(stored).await?;
        log_state(&session, PipelineState::TextExtracted);

        let chunks = split_documents(&documents, options.chunking)
            .map_err(|error| IngestError::new(IngestStage::Chunk, error))?;
        log_state(&session, PipelineState::Chunked);

        let index_error = |error| IngestError::new(IngestStage::Index, IngestFailure::Index(error));
        let (seeded, added, retriever) = {
            let _guard = self.locks.acquire(&index_dir).await;
            let mut manager = VectorIndexManager::<FlatIndex>::new(&index_dir, Arc::clone(&self.embedder))
                .map_err(index_error)?
                .with_batch_size(self.config.embedding_batch_size);

            let seeded = match manager.load_or_create(&chunks).await.map_err(index_error)? {
                LoadOutcome::Created { seeded } => seeded,
                LoadOutcome::Loaded { .. } => 0,
            };
            let added = manager.add_documents(&chunks).await.map_err(index_error)?;
            let retriever = manager.retriever(options.k).map_err(index_error)?;
            (seeded, added, retriever)
        };
        log_state(&session, PipelineState::Indexed);

        let summary = IngestSummary {
            session_id: session.to_string(),
            use_session_dirs: options.use_session_dirs,
            upload_dir,
            index_dir,
            files_saved,
            chunks: chunks.len(),
            seeded,
            added,
            k: options.k,
        };
        self.metrics
            .record_ingestion(summary.chunks as u64, summary.indexed() as u64);

        tracing::info!(
            session_id = %session,
            index_dir = %summary.index_dir.display(),
            files = files_saved,
            chunks = summary.chunks,
            seeded,
            added,
            k = options.k,
            "Ingestion complete"
        );
        log_state(&session, PipelineState::Ready);

        Ok(IngestOutcome { summary, retriever })
    }

    /// Open the index addressed by `options` for querying.
    ///
    /// The load waits for any ingestion writing the same directory, so the vectors and
    /// docstore it reads always belong to one write.
    pub async fn open_retriever(
        &self,
        options: &QueryOptions,
    ) -> Result<(Option<SessionId>, Retriever), QueryError> {
        let session = options
            .session_id
            .as_deref()
            .map(SessionId::parse)
            .transpose()?;

        let index_dir = match (&session, options.use_session_dirs) {
            (Some(session), true) => resolve_dir(&self.config.index_base_dir, session, true),
            (None, true) => return Err(QueryError::MissingSession),
            (_, false) => self.config.index_base_dir.clone(),
        };

        let _guard = self.locks.acquire_read(&index_dir).await;
        if !FlatIndex::exists(&index_dir) {
            return Err(QueryError::IndexNotFound(index_dir));
        }

        let retriever = Retriever::load(&index_dir, Arc::clone(&self.embedder), options.k).await?;
        tracing::debug!(
            index_dir = %index_dir.display(),
            vectors = retriever.len(),
            "Opened index for query"
        );
        Ok((session, retriever))
    }

    /// Answer `question` against the index addressed by `options`.
    pub async fn query(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<QueryAnswer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let (session, retriever) = self.open_retriever(options).await?;
        let hits = retriever.search(question).await?;
        self.metrics.record_query();

        tracing::info!(
            session_id = session.as_ref().map(SessionId::as_str),
            k = options.k,
            hits = hits.len(),
            "Query served"
        );
        Ok(QueryAnswer {
            session_id: session.map(|session| session.to_string()),
            k: options.k,
            hits,
        })
    }

    /// Current ingestion counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn extract_all(&self, stored: Vec<StoredFile>) -> Result<Vec<Document>, IngestError> {
        let extractors = Arc::clone(&self.extractors);
        let documents = tokio::task::spawn_blocking(move || extract_documents(&extractors, stored))
            .await
            .map_err(|error| {
                IngestError::new(
                    IngestStage::ExtractText,
                    IngestFailure::TaskJoin(error.to_string()),
                )
            })??;

        if documents.is_empty() {
            tracing::warn!("Every stored file yielded empty text");
            return Err(IngestError::new(
                IngestStage::ExtractText,
                IngestFailure::NoValidFiles,
            ));
        }
        Ok(documents)
    }
}

fn extract_documents(
    extractors: &ExtractorRegistry,
    stored: Vec<StoredFile>,
) -> Result<Vec<Document>, IngestError> {
    let mut documents = Vec::with_capacity(stored.len());
    for file in stored {
        let text = extractors
            .extract(&file.path, &file.extension)
            .map_err(|source| {
                IngestError::new(
                    IngestStage::ExtractText,
                    IngestFailure::Extraction {
                        file: file.original_name.clone(),
                        source,
                    },
                )
            })?;

        if text.trim().is_empty() {
            tracing::warn!(file = %file.original_name, "No text extracted; file skipped");
            continue;
        }
        documents.push(Document::new(text, document_metadata(&file)));
    }
    Ok(documents)
}

fn document_metadata(file: &StoredFile) -> Metadata {
    let stored_name = file
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut metadata = Metadata::new();
    metadata.insert("file_name".into(), Value::String(stored_name));
    metadata.insert(
        "original_name".into(),
        Value::String(file.original_name.clone()),
    );
    metadata.insert("extension".into(), Value::String(file.extension.clone()));
    metadata
}

fn log_state(session: &SessionId, state: PipelineState) {
    tracing::debug!(session_id = %session, %state, "Ingestion state");
}

#[async_trait]
impl IngestionApi for IngestionService {
    fn default_ingest_options(&self) -> IngestOptions {
        IngestOptions::from_config(&self.config)
    }

    fn default_query_options(&self) -> QueryOptions {
        QueryOptions::from_config(&self.config)
    }

    async fn ingest(
        &self,
        files: Vec<UploadedFile>,
        options: IngestOptions,
    ) -> Result<IngestSummary, IngestError> {
        self.build_retriever(files, options)
            .await
            .map(|outcome| outcome.summary)
    }

    async fn query(
        &self,
        question: &str,
        options: QueryOptions,
    ) -> Result<QueryAnswer, QueryError> {
        IngestionService::query(self, question, &options).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics()
    }
}

