//! SQLite-backed hybrid tool store: an FTS5 virtual table for the keyword
//! leg (ranked via SQLite's built-in `bm25()`), plus a side table of
//! embedding vectors for the semantic leg.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{cosine_similarity, min_max_normalize, semantic_score, Tool, ToolMatch, ToolStore};
use crate::embedding::EmbeddingClient;
use crate::error::{OptimizerError, OptimizerResult};

pub struct SqliteToolStore {
    pool: SqlitePool,
    embedding: Option<Arc<dyn EmbeddingClient>>,
    semantic_ratio: f32,
    semantic_distance_threshold: Option<f32>,
}

impl SqliteToolStore {
    /// Connect to (and initialize) a SQLite-backed store. An empty
    /// `persist_path` uses a private in-memory database.
    pub async fn connect(
        persist_path: &str,
        embedding: Option<Arc<dyn EmbeddingClient>>,
        semantic_ratio: f32,
        semantic_distance_threshold: Option<f32>,
    ) -> OptimizerResult<Self> {
        let url = if persist_path.is_empty() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{persist_path}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backend_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                input_schema TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                UNIQUE(backend_id, name)
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(
                name, description, content='tools', content_rowid='id'
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tool_embeddings (
                tool_id INTEGER PRIMARY KEY,
                vector BLOB NOT NULL,
                FOREIGN KEY(tool_id) REFERENCES tools(id)
            )",
        )
        .execute(&pool)
        .await?;

        let semantic_ratio = if embedding.is_some() { semantic_ratio } else { 0.0 };
        Ok(Self {
            pool,
            embedding,
            semantic_ratio,
            semantic_distance_threshold,
        })
    }

    async fn upsert_one(
        &self,
        tool: &Tool,
        embedding: Option<&[f32]>,
    ) -> OptimizerResult<()> {
        let input_schema = serde_json::to_string(&tool.input_schema)?;
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO tools (backend_id, name, description, input_schema, token_count)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(backend_id, name) DO UPDATE SET
                description = excluded.description,
                input_schema = excluded.input_schema,
                token_count = excluded.token_count
             RETURNING id",
        )
        .bind(&tool.backend_id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(input_schema)
        .bind(tool.token_count as i64)
        .fetch_one(&self.pool)
        .await?;
        let tool_id = row.0;

        sqlx::query("DELETE FROM tools_fts WHERE rowid = ?")
            .bind(tool_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO tools_fts (rowid, name, description) VALUES (?, ?, ?)")
            .bind(tool_id)
            .bind(&tool.name)
            .bind(&tool.description)
            .execute(&self.pool)
            .await?;

        if let Some(vector) = embedding {
            let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
            sqlx::query(
                "INSERT INTO tool_embeddings (tool_id, vector) VALUES (?, ?)
                 ON CONFLICT(tool_id) DO UPDATE SET vector = excluded.vector",
            )
            .bind(tool_id)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    fn decode_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

#[async_trait]
impl ToolStore for SqliteToolStore {
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

        for (tool, embedding) in tools.iter().zip(embeddings.iter()) {
            self.upsert_one(tool, embedding.as_deref()).await?;
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

        let rows: Vec<SqliteRow> = sqlx::query("SELECT id, backend_id, name, description, input_schema, token_count FROM tools")
            .fetch_all(&self.pool)
            .await
            .map_err(OptimizerError::from)?;

        let mut tools_by_name: HashMap<String, (i64, Tool)> = HashMap::new();
        for row in rows {
            let name: String = row.try_get("name").map_err(OptimizerError::from)?;
            if !allow_list.contains(&name) {
                continue;
            }
            let id: i64 = row.try_get("id").map_err(OptimizerError::from)?;
            let backend_id: String = row.try_get("backend_id").map_err(OptimizerError::from)?;
            let description: String = row.try_get("description").map_err(OptimizerError::from)?;
            let input_schema_raw: String = row.try_get("input_schema").map_err(OptimizerError::from)?;
            let token_count: i64 = row.try_get("token_count").map_err(OptimizerError::from)?;
            let input_schema = serde_json::from_str(&input_schema_raw)?;
            tools_by_name.insert(
                name.clone(),
                (
                    id,
                    Tool {
                        name,
                        description,
                        input_schema,
                        backend_id,
                        token_count: token_count as u32,
                    },
                ),
            );
        }

        let mut kw_raw: Vec<(String, f32)> = tools_by_name
            .keys()
            .map(|name| (name.clone(), 0.0))
            .collect();

        if !query_text.trim().is_empty() {
            let matches: Vec<(String, f64)> = sqlx::query(
                "SELECT tools.name as name, bm25(tools_fts) as rank
                 FROM tools_fts JOIN tools ON tools.id = tools_fts.rowid
                 WHERE tools_fts MATCH ?",
            )
            .bind(query_text)
            .fetch_all(&self.pool)
            .await
            .map_err(OptimizerError::from)?
            .into_iter()
            .map(|row| {
                let name: String = row.get("name");
                let rank: f64 = row.get("rank");
                // SQLite's bm25() is smaller-is-better; negate so
                // higher-is-better matches the semantic leg's convention.
                (name, -rank)
            })
            .collect();

            for (name, rank) in matches {
                if let Some(entry) = kw_raw.iter_mut().find(|(n, _)| n == &name) {
                    entry.1 = rank as f32;
                }
            }
        }

        let kw_normalized = min_max_normalize(&kw_raw);

        let query_embedding = if self.semantic_ratio > 0.0 {
            if let Some(client) = &self.embedding {
                Some(client.embed(query_text).await?)
            } else {
                None
            }
        } else {
            None
        };

        let mut scored: Vec<ToolMatch> = Vec::new();
        for (name, (id, tool)) in tools_by_name {
            let kw = kw_normalized
                .iter()
                .find(|(n, _)| n == &name)
                .map(|(_, s)| *s)
                .unwrap_or(0.0);

            let sem = if let Some(query_vec) = &query_embedding {
                let row: Option<(Vec<u8>,)> =
                    sqlx::query_as("SELECT vector FROM tool_embeddings WHERE tool_id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                match row {
                    Some((bytes,)) => {
                        let vector = Self::decode_vector(&bytes);
                        let sim = cosine_similarity(query_vec, &vector);
                        if let Some(threshold) = self.semantic_distance_threshold {
                            if threshold > 0.0 && (1.0 - sim) > threshold as f64 {
                                continue;
                            }
                        }
                        semantic_score(sim)
                    }
                    None => 0.0,
                }
            } else {
                0.0
            };

            let score = self.semantic_ratio * sem + (1.0 - self.semantic_ratio) * kw;
            scored.push(ToolMatch {
                name,
                description: tool.description,
                input_schema: tool.input_schema,
                backend_id: tool.backend_id,
                score,
                token_count: tool.token_count,
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
        let row: (Option<i64>,) = sqlx::query_as("SELECT SUM(token_count) FROM tools")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0) as u64)
    }

    async fn close(&self) -> OptimizerResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
