//! Tool Store (C3): tool corpus plus hybrid keyword+semantic search.

mod memory;
mod sqlite;

pub use memory::InMemoryToolStore;
pub use sqlite::SqliteToolStore;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OptimizerResult;

/// A tool as stored and searched by the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub backend_id: String,
    pub token_count: u32,
}

/// One search result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMatch {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub backend_id: String,
    pub score: f32,
    pub token_count: u32,
}

/// Owns the tool corpus and executes hybrid search over it.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Insert or overwrite tools keyed by `(backend_id, name)`.
    async fn upsert(&self, tools: Vec<Tool>) -> OptimizerResult<()>;

    /// Hybrid search, scoped to `allow_list`. Returns at most `k` matches,
    /// ranked by descending score, stable tie-break by name ascending.
    async fn search(
        &self,
        query_text: &str,
        allow_list: &HashSet<String>,
        k: usize,
    ) -> OptimizerResult<Vec<ToolMatch>>;

    /// Sum of `token_count` across every stored tool.
    async fn total_tokens(&self) -> OptimizerResult<u64>;

    /// Release any external resources. Idempotent.
    async fn close(&self) -> OptimizerResult<()> {
        Ok(())
    }
}

/// Cosine similarity between two vectors, in `[-1, 1]`. Mismatched lengths
/// or an empty vector score 0.0 rather than panicking.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut mag_a = 0.0f64;
    let mut mag_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Map a cosine similarity in `[-1, 1]` to a score in `[0, 1]`.
pub(crate) fn semantic_score(similarity: f64) -> f32 {
    (((similarity + 1.0) / 2.0).clamp(0.0, 1.0)) as f32
}

/// Min-max normalize a set of raw scores into `[0, 1]`. Flat inputs (all
/// equal, including all-zero) normalize to 1.0 when non-empty and positive,
/// 0.0 otherwise, so a single keyword match isn't zeroed out.
pub(crate) fn min_max_normalize(scores: &[(String, f32)]) -> Vec<(String, f32)> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        let normalized = if max > 0.0 { 1.0 } else { 0.0 };
        return scores
            .iter()
            .map(|(id, _)| (id.clone(), normalized))
            .collect();
    }
    scores
        .iter()
        .map(|(id, s)| (id.clone(), (s - min) / (max - min)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
    }

    #[test]
    fn cosine_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_empty_is_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn semantic_score_maps_range() {
        assert!((semantic_score(1.0) - 1.0).abs() < 1e-6);
        assert!((semantic_score(-1.0) - 0.0).abs() < 1e-6);
        assert!((semantic_score(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn min_max_normalize_spreads_range() {
        let scores = vec![("a".to_string(), 1.0), ("b".to_string(), 3.0), ("c".to_string(), 2.0)];
        let normalized = min_max_normalize(&scores);
        let get = |id: &str| normalized.iter().find(|(n, _)| n == id).unwrap().1;
        assert!((get("a") - 0.0).abs() < 1e-6);
        assert!((get("b") - 1.0).abs() < 1e-6);
        assert!((get("c") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn min_max_normalize_flat_positive_is_one() {
        let scores = vec![("a".to_string(), 1.0), ("b".to_string(), 1.0)];
        let normalized = min_max_normalize(&scores);
        assert!(normalized.iter().all(|(_, s)| (*s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn min_max_normalize_flat_zero_is_zero() {
        let scores = vec![("a".to_string(), 0.0), ("b".to_string(), 0.0)];
        let normalized = min_max_normalize(&scores);
        assert!(normalized.iter().all(|(_, s)| *s == 0.0));
    }
}
