//! Ingestion pipeline orchestration and query serving.
//!
//! A run moves uploads through four ordered stages (save, extract, chunk, index). The
//! first failure aborts the run with an [`IngestError`] naming the stage; nothing already
//! written is rolled back.

mod service;
mod types;

pub use service::{IngestionApi, IngestionService};
pub use types::{
    IngestError, IngestFailure, IngestOptions, IngestOutcome, IngestStage, IngestSummary,
    PipelineState, QueryAnswer, QueryError, QueryOptions,
};
