//! In-memory hybrid tool store: case-insensitive substring keyword leg,
//! linear-scan cosine semantic leg.
//!
//! Mirrors the multi-`DashMap` layout of a tool inventory kept in sync on
//! insert/clear, narrowed to the two indices this store actually needs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{cosine_similarity, min_max_normalize, semantic_score, Tool, ToolMatch, ToolStore};
use crate::embedding::EmbeddingClient;
use crate::error::OptimizerResult;

#[derive(Clone)]
struct Row {
    tool: Tool,
    embedding: Option<Vec<f32>>,
}

fn row_key(backend_id: &str, name: &str) -> String {
    format!("{backend_id}\u{0}{name}")
}

pub struct InMemoryToolStore {
    rows: DashMap<String, Row>,
    embedding: Option<Arc<dyn EmbeddingClient>>,
    semantic_ratio: f32,
    semantic_distance_threshold: Option<f32>,
    total_tokens: AtomicU64,
}

impl InMemoryToolStore {
    pub fn new(
        embedding: Option<Arc<dyn EmbeddingClient>>,
        semantic_ratio: f32,
        semantic_distance_threshold: Option<f32>,
    ) -> Self {
        let semantic_ratio = if embedding.is_some() { semantic_ratio } else { 0.0 };
        Self {
            rows: DashMap::new(),
            embedding,
            semantic_ratio,
            semantic_distance_threshold,
            total_tokens: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ToolStore for InMemoryToolStore {
    async fn upsert(&self, tools: Vec<Tool>) -> OptimizerResult<()> {
        let embeddings: Vec<Option<Vec<f32>>> = if let Some(client) = &self.embedding {
            let texts: Vec<String> = tools
                .iter()
                .map(|t| format!("{}: {}", t.name, t.description))
                .collect();
            client
                .embed_batch(&texts)
                .await?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; tools.len()]
        };

        for (tool, embedding) in tools.into_iter().zip(embeddings.into_iter()) {
            let key = row_key(&tool.backend_id, &tool.name);
            if let Some(old) = self.rows.get(&key) {
                self.total_tokens
                    .fetch_sub(old.tool.token_count as u64, Ordering::Relaxed);
            }
            self.total_tokens
                .fetch_add(tool.token_count as u64, Ordering::Relaxed);
            self.rows.insert(key, Row { tool, embedding });
        }
        Ok(())
    }

    async fn search(
        &self,
        query_text: &str,
        allow_list: &HashSet<String>,
        k: usize,
    ) -> OptimizerResult<Vec<ToolMatch>> {
        if allow_list.is_empty() {
            return Ok(Vec::new());
        }

        let query_lower = query_text.to_lowercase();
        let query_embedding = if self.semantic_ratio > 0.0 {
            if let Some(client) = &self.embedding {
                Some(client.embed(query_text).await?)
            } else {
                None
            }
        } else {
            None
        };

        let mut kw_raw: Vec<(String, f32)> = Vec::new();
        let mut candidates: Vec<Row> = Vec::new();

        for entry in self.rows.iter() {
            let row = entry.value();
            if !allow_list.contains(&row.tool.name) {
                continue;
            }
            let haystack = format!("{} {}", row.tool.name, row.tool.description).to_lowercase();
            let kw_score = if query_lower.is_empty() {
                0.0
            } else if haystack.contains(&query_lower) {
                1.0
            } else {
                0.0
            };
            kw_raw.push((row.tool.name.clone(), kw_score));
            candidates.push(row.clone());
        }

        let kw_normalized = min_max_normalize(&kw_raw);

        let mut scored: Vec<ToolMatch> = Vec::new();
        for row in candidates {
            let kw = kw_normalized
                .iter()
                .find(|(name, _)| name == &row.tool.name)
                .map(|(_, s)| *s)
                .unwrap_or(0.0);

            let sem = match (&query_embedding, &row.embedding) {
                (Some(q), Some(e)) if q.len() == e.len() => {
                    let sim = cosine_similarity(q, e);
                    if let Some(threshold) = self.semantic_distance_threshold {
                        if threshold > 0.0 && (1.0 - sim) > threshold as f64 {
                            continue;
                        }
                    }
                    semantic_score(sim)
                }
                _ => 0.0,
            };

            let score = self.semantic_ratio * sem + (1.0 - self.semantic_ratio) * kw;
            scored.push(ToolMatch {
                name: row.tool.name,
                description: row.tool.description,
                input_schema: row.tool.input_schema,
                backend_id: row.tool.backend_id,
                score,
                token_count: row.tool.token_count,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn total_tokens(&self) -> OptimizerResult<u64> {
        Ok(self.total_tokens.load(Ordering::Relaxed))
    }
}
