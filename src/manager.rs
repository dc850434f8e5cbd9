//! Optimizer Manager (C9): owns the process-wide store, routing table,
//! ingestion service, and embedding client for their full lifecycle, and
//! decides whether optimizer mode applies to a given MCP session.

use std::sync::Arc;

use rmcp::model::Tool as McpTool;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::{BackendClient, BackendRegistry};
use crate::config::OptimizerConfig;
use crate::embedding::{EmbeddingClient, FakeEmbeddingClient, HttpEmbeddingClient};
use crate::error::OptimizerResult;
use crate::handlers::build_meta_tools;
use crate::ingestion::IngestionService;
use crate::metrics::Observability;
use crate::routing::RoutingTable;
use crate::session::OptimizerSession;
use crate::store::{InMemoryToolStore, SqliteToolStore, ToolStore};
use crate::token::TokenCounter;

/// Shared process-wide handles an enabled manager owns.
struct Shared {
    config: OptimizerConfig,
    store: Arc<dyn ToolStore>,
    routing: Arc<RoutingTable>,
    ingestion: Arc<IngestionService>,
    observability: Arc<Observability>,
    embedding: Option<Arc<dyn EmbeddingClient>>,
    token_counter: TokenCounter,
}

/// Top-level lifecycle owner. When configuration disables the optimizer,
/// `OptimizerManager` degrades to a no-op: session registration always
/// declines and ingestion is skipped, without special-casing callers.
pub struct OptimizerManager {
    shared: Option<Shared>,
}

impl OptimizerManager {
    /// Construct from configuration, validating it first. A disabled
    /// configuration still validates but yields a no-op manager.
    pub async fn new(config: OptimizerConfig) -> OptimizerResult<Self> {
        config.validate()?;

        if !config.enabled {
            info!("optimizer disabled by configuration");
            return Ok(Self { shared: None });
        }

        let embedding: Option<Arc<dyn EmbeddingClient>> = if !config.embedding_service_url.is_empty() {
            Some(Arc::new(HttpEmbeddingClient::new(
                config.embedding_service_url.clone(),
                config.embedding_service_timeout,
                config.embedding_dimension.max(1),
            )))
        } else if config.embedding_dimension > 0 {
            Some(Arc::new(FakeEmbeddingClient::new(config.embedding_dimension)))
        } else {
            None
        };

        let semantic_ratio = config.effective_ratio();
        let distance_threshold = if config.semantic_distance_threshold > 0.0 {
            Some(config.semantic_distance_threshold)
        } else {
            None
        };

        let store: Arc<dyn ToolStore> = if config.persist_path.is_empty() {
            Arc::new(InMemoryToolStore::new(
                embedding.clone(),
                semantic_ratio,
                distance_threshold,
            ))
        } else {
            Arc::new(
                SqliteToolStore::connect(
                    &config.persist_path,
                    embedding.clone(),
                    semantic_ratio,
                    distance_threshold,
                )
                .await?,
            )
        };

        let routing = Arc::new(RoutingTable::new());
        let token_counter = TokenCounter::new(config.token_divisor);
        let ingestion = Arc::new(IngestionService::new(
            Arc::clone(&store),
            Arc::clone(&routing),
            token_counter,
        ));
        let observability = Arc::new(Observability::new());

        Ok(Self {
            shared: Some(Shared {
                config,
                store,
                routing,
                ingestion,
                observability,
                embedding,
                token_counter,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    /// The two meta-tools to register globally. Empty when disabled.
    pub fn meta_tools(&self) -> Vec<McpTool> {
        match &self.shared {
            Some(shared) => build_meta_tools(&shared.config),
            None => Vec::new(),
        }
    }

    /// Sweep every backend in the registry at startup. A no-op when disabled.
    #[instrument(skip(self, registry, client, cancellation))]
    pub async fn ingest_initial_backends(
        &self,
        registry: &dyn BackendRegistry,
        client: &dyn BackendClient,
        cancellation: &CancellationToken,
    ) -> OptimizerResult<usize> {
        match &self.shared {
            Some(shared) => shared.ingestion.ingest_all(registry, client, cancellation).await,
            None => Ok(0),
        }
    }

    /// Decide whether optimizer mode applies to a newly registered MCP
    /// session. Returns `None` ("handled=false") when disabled, so the
    /// host falls back to injecting backend tools directly.
    pub async fn register_session(
        &self,
        client: Arc<dyn BackendClient>,
        backend_id: &str,
        visible_tools: Vec<(String, String, serde_json::Value)>,
    ) -> OptimizerResult<Option<OptimizerSession>> {
        let Some(shared) = &self.shared else {
            return Ok(None);
        };

        let session = OptimizerSession::new(
            Arc::clone(&shared.store),
            Arc::clone(&shared.routing),
            client,
            Arc::clone(&shared.observability),
            &shared.token_counter,
            backend_id,
            visible_tools,
        )
        .await?;

        Ok(Some(session))
    }

    /// Release store, ingestion, and embedding-client resources exactly
    /// once. Idempotent and swallows close errors (logged at warn), per
    /// the shutdown contract: `close()` never fails a caller.
    pub async fn close(&self) {
        let Some(shared) = &self.shared else {
            return;
        };
        if let Err(e) = shared.store.close().await {
            warn!(error = %e, "error closing tool store");
        }
        if let Err(e) = shared.ingestion.close().await {
            warn!(error = %e, "error closing ingestion service");
        }
        if let Some(embedding) = &shared.embedding {
            embedding.close().await;
        }
    }
}
