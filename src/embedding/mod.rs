//! Embedding Client (C2): text → fixed-dimension vector, pluggable backend.

mod fake;
mod http;

pub use fake::FakeEmbeddingClient;
pub use http::HttpEmbeddingClient;

use async_trait::async_trait;

use crate::error::OptimizerResult;

/// A pluggable client that turns text into unit-normalized embedding
/// vectors. Implementations must be deterministic for equal input within a
/// run and must return vectors of exactly [`EmbeddingClient::dimension`].
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> OptimizerResult<Vec<f32>>;

    /// Embed a batch, preserving order. Default implementation calls
    /// [`EmbeddingClient::embed`] sequentially; implementations that have a
    /// native batch endpoint should override this.
    async fn embed_batch(&self, texts: &[String]) -> OptimizerResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;

    /// Release any resources (connection pools, etc). Idempotent.
    async fn close(&self) {}
}

/// Normalize a vector to unit length in place. A zero vector is left
/// unchanged (its similarity to anything is defined as 0 by the caller).
pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
