#![deny(missing_docs)]

//! Document portal backend: session-scoped uploads, text extraction, chunking, and
//! deduplicated persistent vector indexes with top-k retrieval.

/// HTTP routing and REST handlers.
pub mod api;
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
pub mod document;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Session identifiers and per-session directories.
pub mod session;
/// Upload persistence.
pub mod storage;
