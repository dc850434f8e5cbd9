//! Remote embedding client over HTTP.
//!
//! Posts `{"inputs": [...], "truncate": true}` to `<base_url>/embed` and
//! expects a JSON array of float arrays, one per input, in order.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::normalize;
use crate::embedding::EmbeddingClient;
use crate::error::{OptimizerError, OptimizerResult};

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponseRow(Vec<f32>);

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> OptimizerResult<Vec<f32>> {
        let mut rows = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        rows.pop()
            .ok_or_else(|| OptimizerError::EmbeddingUnavailable("empty response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> OptimizerResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let body = json!(EmbedRequest {
            inputs: texts,
            truncate: true,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OptimizerError::Timeout(format!("embedding request timed out: {e}"))
                } else {
                    OptimizerError::EmbeddingUnavailable(format!("embedding request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(OptimizerError::EmbeddingUnavailable(format!(
                "embedding service returned status {}",
                response.status()
            )));
        }

        let rows: Vec<EmbedResponseRow> = response.json().await.map_err(|e| {
            OptimizerError::EmbeddingUnavailable(format!("invalid embedding response: {e}"))
        })?;

        if rows.len() != texts.len() {
            return Err(OptimizerError::EmbeddingUnavailable(format!(
                "embedding service returned {} vectors for {} inputs",
                rows.len(),
                texts.len()
            )));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut v = row.0;
                normalize(&mut v);
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_trims_trailing_slash() {
        let client = HttpEmbeddingClient::new("http://localhost:8080/", Duration::from_secs(1), 8);
        assert_eq!(client.base_url.trim_end_matches('/'), "http://localhost:8080");
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let client = HttpEmbeddingClient::new("http://localhost:1", Duration::from_millis(10), 8);
        let out = client.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
