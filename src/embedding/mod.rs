//! Embedding client abstraction and adapters.

mod hashing;
mod ollama;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Shared handle to an embedding backend.
pub type SharedEmbeddingClient = Arc<dyn EmbeddingClient>;

/// Build an embedding client suitable for the given configuration.
pub fn get_embedding_client(config: &Config) -> Result<SharedEmbeddingClient, EmbeddingClientError> {
    let client: SharedEmbeddingClient = match config.embedding_provider {
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )?),
    };
    tracing::info!(provider = ?config.embedding_provider, model = %config.embedding_model, "Embedding client initialized");
    Ok(client)
}
