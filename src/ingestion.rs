//! Ingestion Service (C4): pulls tools from backends into the shared
//! [`ToolStore`] and [`RoutingTable`], computing token counts and
//! embeddings along the way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, BackendClient, BackendRegistry, BackendTarget, BackendTool};
use crate::error::{OptimizerError, OptimizerResult};
use crate::routing::{RoutingEntry, RoutingTable};
use crate::store::{Tool, ToolStore};
use crate::token::TokenCounter;

pub struct IngestionService {
    store: Arc<dyn ToolStore>,
    routing: Arc<RoutingTable>,
    token_counter: TokenCounter,
    embedding_nanos: AtomicU64,
}

impl IngestionService {
    pub fn new(store: Arc<dyn ToolStore>, routing: Arc<RoutingTable>, token_counter: TokenCounter) -> Self {
        Self {
            store,
            routing,
            token_counter,
            embedding_nanos: AtomicU64::new(0),
        }
    }

    /// Ingest one backend's tools, registering routing entries and
    /// upserting the tool rows. Best-effort: callers should treat a
    /// returned error as "skip this backend", not fatal to startup.
    #[instrument(skip(self, tools), fields(backend_id = %backend_id, tools.count = tools.len()))]
    pub async fn ingest(
        &self,
        backend_id: &str,
        backend_name: &str,
        tools: Vec<BackendTool>,
    ) -> OptimizerResult<usize> {
        debug!(backend = %backend_name, "ingesting backend tools");
        let mut rows = Vec::with_capacity(tools.len());
        for tool in &tools {
            let public_name = self.routing.insert(
                RoutingEntry::new(tool.name.clone(), backend_id.to_string()),
            );
            let token_count =
                self.token_counter
                    .count(&public_name, &tool.description, &tool.input_schema);
            rows.push(Tool {
                name: public_name,
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
                backend_id: backend_id.to_string(),
                token_count,
            });
        }

        let started = Instant::now();
        self.store.upsert(rows).await?;
        self.embedding_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);

        info!(backend = %backend_name, tools.ingested = tools.len(), "backend ingestion complete");
        Ok(tools.len())
    }

    /// Sweep every backend in the registry, ingesting best-effort. A
    /// failing backend is logged and skipped, never fails the sweep.
    #[instrument(skip(self, registry, client, cancellation))]
    pub async fn ingest_all(
        &self,
        registry: &dyn BackendRegistry,
        client: &dyn BackendClient,
        cancellation: &CancellationToken,
    ) -> OptimizerResult<usize> {
        if cancellation.is_cancelled() {
            return Err(OptimizerError::Canceled);
        }
        let backends = registry.list().await?;
        info!(backends.count = backends.len(), "starting ingestion sweep");

        let mut ingested = 0;
        for backend in &backends {
            if cancellation.is_cancelled() {
                warn!("ingestion sweep canceled mid-sweep");
                return Err(OptimizerError::Canceled);
            }
            match self.ingest_one(backend, client).await {
                Ok(count) => ingested += count,
                Err(e) => {
                    warn!(backend = %backend.name, error = %e, "skipping backend ingestion failure");
                }
            }
        }
        Ok(ingested)
    }

    async fn ingest_one(&self, backend: &Backend, client: &dyn BackendClient) -> OptimizerResult<usize> {
        let target: BackendTarget = backend.into();
        let tools = client.list_capabilities(&target).await?;
        self.ingest(&backend.id, &backend.name, tools).await
    }

    pub async fn total_tool_tokens(&self) -> OptimizerResult<u64> {
        self.store.total_tokens().await
    }

    pub fn total_embedding_time(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.embedding_nanos.load(Ordering::Relaxed))
    }

    /// Zero the accumulated embedding-time counter.
    pub fn reset_embedding_time(&self) {
        self.embedding_nanos.store(0, Ordering::Relaxed);
    }

    /// Release any resources this service owns directly. The service holds
    /// no closable handles of its own (the store and embedding client are
    /// closed separately by their owner); idempotent no-op kept for
    /// symmetry with `ToolStore::close`/`EmbeddingClient::close`.
    pub async fn close(&self) -> OptimizerResult<()> {
        Ok(())
    }
}
