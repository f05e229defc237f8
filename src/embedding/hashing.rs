use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic offline embeddings built by hashing lower-cased word tokens into buckets.
///
/// Texts sharing words end up with a positive cosine similarity, which is enough for local
/// development and tests without a model runtime.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let slot = (fnv1a(&token.to_lowercase()) % dimension as u64) as usize;
            embedding[slot] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            dimension = self.dimension,
            texts = texts.len(),
            "Generating hashing embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(64);
        let first = client
            .generate_embeddings(vec!["Alpha beta gamma".into()])
            .await
            .expect("embeddings");
        let second = client
            .generate_embeddings(vec!["alpha BETA gamma".into()])
            .await
            .expect("embeddings");
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher_than_disjoint_text() {
        let client = HashingEmbeddingClient::new(768);
        let vectors = client
            .generate_embeddings(vec![
                "kangaroo marsupial".into(),
                "the kangaroo is a marsupial native to australia".into(),
                "volcanic eruptions release magma".into(),
            ])
            .await
            .expect("embeddings");
        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let client = HashingEmbeddingClient::new(8);
        let vectors = client
            .generate_embeddings(vec!["   ".into()])
            .await
            .expect("embeddings");
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn rejects_empty_batches_and_zero_dimension() {
        let error = HashingEmbeddingClient::new(8)
            .generate_embeddings(Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));

        let error = HashingEmbeddingClient::new(0)
            .generate_embeddings(vec!["x".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }
}
