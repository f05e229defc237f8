//! HTTP surface for the document portal.
//!
//! - `GET /health` – Liveness probe.
//! - `POST /chat/index` – Multipart upload (`files`, plus optional `session_id`,
//!   `use_session_dirs`, `chunk_size`, `chunk_overlap`, `k`). Saves, extracts, chunks, and
//!   indexes the files, returning the session id and indexing counters.
//! - `POST /chat/query` – JSON `{question, session_id?, use_session_dirs?, k?}`; returns the
//!   top `k` chunks from the addressed index.
//! - `GET /metrics` – Ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for discovery.

use crate::config::parse_flag;
use crate::ingest::{
    IngestError, IngestFailure, IngestionApi, QueryAnswer, QueryError,
};
use crate::extract::ExtractError;
use crate::metrics::MetricsSnapshot;
use crate::storage::UploadedFile;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router. Request bodies above `max_upload_bytes` are rejected.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/chat/index", post(index_documents::<S>))
        .route("/chat/query", post(query_index::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "docportal" }))
}

/// Success response for `POST /chat/index`.
#[derive(Serialize)]
struct IndexResponse {
    session_id: String,
    k: usize,
    use_session_dirs: bool,
    files: usize,
    chunks: usize,
    seeded: usize,
    added: usize,
}

/// Accept an upload, run the ingestion pipeline, and report what was indexed.
async fn index_documents<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<IndexResponse>, AppError>
where
    S: IngestionApi,
{
    let mut options = service.default_ingest_options();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(AppError::multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(AppError::multipart)?;
                files.push(UploadedFile::new(file_name, content));
            }
            "session_id" => {
                let value = field.text().await.map_err(AppError::multipart)?;
                let value = value.trim();
                options.session_id = (!value.is_empty()).then(|| value.to_string());
            }
            "use_session_dirs" => {
                let value = field.text().await.map_err(AppError::multipart)?;
                options.use_session_dirs = parse_flag(&value).ok_or_else(|| {
                    AppError::bad_request(format!("use_session_dirs: invalid boolean '{value}'"))
                })?;
            }
            "chunk_size" => {
                options.chunking.chunk_size = parse_count(&name, field.text().await)?;
            }
            "chunk_overlap" => {
                options.chunking.chunk_overlap = parse_count(&name, field.text().await)?;
            }
            "k" => options.k = positive(&name, parse_count(&name, field.text().await)?)?,
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    if files.is_empty() {
        return Err(AppError::bad_request("at least one file is required"));
    }

    let summary = service.ingest(files, options).await?;
    tracing::info!(
        session_id = %summary.session_id,
        chunks = summary.chunks,
        indexed = summary.indexed(),
        "Index request completed"
    );
    Ok(Json(IndexResponse {
        session_id: summary.session_id,
        k: summary.k,
        use_session_dirs: summary.use_session_dirs,
        files: summary.files_saved,
        chunks: summary.chunks,
        seeded: summary.seeded,
        added: summary.added,
    }))
}

fn parse_count(name: &str, raw: Result<String, MultipartError>) -> Result<usize, AppError> {
    let raw = raw.map_err(AppError::multipart)?;
    raw.trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("{name}: expected a non-negative integer, got '{raw}'")))
}

fn positive(name: &str, value: usize) -> Result<usize, AppError> {
    if value == 0 {
        return Err(AppError::bad_request(format!("{name} must be at least 1")));
    }
    Ok(value)
}

/// Request body for `POST /chat/query`.
#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    use_session_dirs: Option<bool>,
    #[serde(default)]
    k: Option<usize>,
}

/// Retrieve the chunks closest to a question.
async fn query_index<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>, AppError>
where
    S: IngestionApi,
{
    let mut options = service.default_query_options();
    options.session_id = request.session_id.filter(|id| !id.trim().is_empty());
    if let Some(use_session_dirs) = request.use_session_dirs {
        options.use_session_dirs = use_session_dirs;
    }
    if let Some(k) = request.k {
        options.k = positive("k", k)?;
    }

    let answer = service.query(&request.question, options).await?;
    Ok(Json(answer))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe.",
                request_example: None,
            },
            CommandDescriptor {
                name: "index",
                method: "POST",
                path: "/chat/index",
                description: "Multipart upload of pdf/docx/txt files. Files are saved, extracted, chunked, and added to the session index; chunks already indexed are skipped.",
                request_example: Some(json!({
                    "files": ["report.pdf", "notes.txt"],
                    "session_id": "optional-session",
                    "use_session_dirs": true,
                    "chunk_size": 1000,
                    "chunk_overlap": 200,
                    "k": 5
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/chat/query",
                description: "Return the top k chunks for a question. session_id is required when use_session_dirs is true.",
                request_example: Some(json!({
                    "question": "What was revenue in Q3?",
                    "session_id": "session_20250101_120000_ab12cd34",
                    "use_session_dirs": true,
                    "k": 5
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters.",
                request_example: None,
            },
        ],
    })
}

/// Error response carrying an HTTP status and a `{"detail": ...}` body.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn multipart(error: MultipartError) -> Self {
        Self {
            status: error.status(),
            detail: error.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "Request failed");
        } else {
            tracing::warn!(status = %self.status, detail = %self.detail, "Request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(error: IngestError) -> Self {
        let status = match &error.source {
            IngestFailure::Session(_) | IngestFailure::Chunking(_) => StatusCode::BAD_REQUEST,
            IngestFailure::NoValidFiles => StatusCode::UNPROCESSABLE_ENTITY,
            IngestFailure::Extraction { source, .. } => match source {
                ExtractError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
            IngestFailure::FileStore(_) | IngestFailure::Index(_) | IngestFailure::TaskJoin(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        let status = match &error {
            QueryError::EmptyQuestion | QueryError::MissingSession | QueryError::Session(_) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::IndexNotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}
