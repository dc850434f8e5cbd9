//! Deterministic fake embedding client used for tests and for servers
//! running without a real embedding service configured.

use async_trait::async_trait;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::normalize;
use crate::embedding::EmbeddingClient;
use crate::error::OptimizerResult;

/// Produces a unit-normalized vector of fixed dimensionality, seeded from a
/// stable hash of the input text. Equal text always yields a bit-identical
/// vector within a process; different text yields (with overwhelming
/// probability) a different vector.
pub struct FakeEmbeddingClient {
    dimension: usize,
}

impl FakeEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let hash = blake3::hash(text.as_bytes());
        let seed: [u8; 32] = *hash.as_bytes();
        let mut rng = ChaCha8Rng::from_seed(seed);
        let mut out = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // Map u32 into [-1, 1) to give the vector both signs, as a real
            // embedding model's components would have.
            let bits = rng.next_u32();
            let value = (bits as f32 / u32::MAX as f32) * 2.0 - 1.0;
            out.push(value);
        }
        normalize(&mut out);
        out
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, text: &str) -> OptimizerResult<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_within_process() {
        let client = FakeEmbeddingClient::new(8);
        let a = client.embed("fetch a url").await.unwrap();
        let b = client.embed("fetch a url").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn dimension_matches_config() {
        let client = FakeEmbeddingClient::new(16);
        let v = client.embed("anything").await.unwrap();
        assert_eq!(v.len(), 16);
        assert_eq!(client.dimension(), 16);
    }

    #[tokio::test]
    async fn different_text_differs() {
        let client = FakeEmbeddingClient::new(8);
        let a = client.embed("read a file").await.unwrap();
        let b = client.embed("write a file").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_normalized() {
        let client = FakeEmbeddingClient::new(32);
        let v = client.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let client = FakeEmbeddingClient::new(4);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = client.embed_batch(&texts).await.unwrap();
        for (text, vec) in texts.iter().zip(batch.iter()) {
            let single = client.embed(text).await.unwrap();
            assert_eq!(&single, vec);
        }
    }
}
