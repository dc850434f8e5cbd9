//! Optimizer Session (C6): the per-client view over the shared tool corpus
//! — an allow-list, a precomputed token baseline, and the two operations a
//! session actually exposes, `find_tool` and `call_tool`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::backend::{Backend, BackendClient, BackendContent, ResourceBody};
use crate::error::{OptimizerError, OptimizerResult};
use crate::metrics::{token_metrics, Observability};
use crate::routing::RoutingTable;
use crate::store::{Tool, ToolMatch, ToolStore};
use crate::token::TokenCounter;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 50;

/// A `find_tool` match, with the public name resolved through the routing
/// table rather than whatever internal name the store happened to key on.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSearchResult {
    pub public_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub backend_id: String,
    pub score: f32,
    pub token_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenMetrics {
    pub baseline_tokens: u64,
    pub returned_tokens: u64,
    pub tokens_saved: u64,
    pub savings_percent: f64,
}

/// Content returned from a dispatched backend call, translated into the
/// optimizer's own vocabulary (the MCP wire shape is assembled by the
/// handler layer, not here).
#[derive(Debug, Clone)]
pub enum ResultContent {
    Text(String),
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    Resource {
        uri: String,
        mime_type: Option<String>,
        body: ResourceBody,
    },
}

#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub content: Vec<ResultContent>,
    pub is_error: bool,
}

/// Bundles the per-session allow-list and token baseline with shared
/// handles into the global store, routing table, and backend client — the
/// session itself owns no tool data, only the view over it.
pub struct OptimizerSession {
    store: Arc<dyn ToolStore>,
    routing: Arc<RoutingTable>,
    client: Arc<dyn BackendClient>,
    observability: Arc<Observability>,
    allow_list: HashSet<String>,
    baseline_tokens: u64,
}

impl OptimizerSession {
    /// Construct a session scoped to `visible_tools`, upserting them into
    /// the shared store and precomputing the token baseline they cost.
    pub async fn new(
        store: Arc<dyn ToolStore>,
        routing: Arc<RoutingTable>,
        client: Arc<dyn BackendClient>,
        observability: Arc<Observability>,
        token_counter: &TokenCounter,
        backend_id: &str,
        visible_tools: Vec<(String, String, serde_json::Value)>,
    ) -> OptimizerResult<Self> {
        let mut allow_list = HashSet::with_capacity(visible_tools.len());
        let mut rows = Vec::with_capacity(visible_tools.len());
        let mut baseline_tokens: u64 = 0;

        for (name, description, input_schema) in visible_tools {
            let token_count = token_counter.count(&name, &description, &input_schema);
            baseline_tokens += token_count as u64;
            allow_list.insert(name.clone());
            rows.push(Tool {
                name,
                description,
                input_schema,
                backend_id: backend_id.to_string(),
                token_count,
            });
        }

        store.upsert(rows).await?;

        Ok(Self {
            store,
            routing,
            client,
            observability,
            allow_list,
            baseline_tokens,
        })
    }

    pub fn baseline_tokens(&self) -> u64 {
        self.baseline_tokens
    }

    pub fn allow_list(&self) -> &HashSet<String> {
        &self.allow_list
    }

    #[instrument(skip(self, description, keywords, cancellation))]
    pub async fn find_tool(
        &self,
        description: &str,
        keywords: Option<&str>,
        limit: Option<u32>,
        cancellation: &CancellationToken,
    ) -> OptimizerResult<(Vec<ToolSearchResult>, TokenMetrics)> {
        if cancellation.is_cancelled() {
            return Err(OptimizerError::Canceled);
        }
        if description.trim().is_empty() {
            return Err(OptimizerError::invalid("tool_description must not be empty"));
        }
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

        let query_text = match keywords {
            Some(kw) if !kw.trim().is_empty() => format!("{description} {kw}"),
            _ => description.to_string(),
        };

        let matches = self
            .store
            .search(&query_text, &self.allow_list, limit)
            .await?;

        let resolved: Vec<ToolSearchResult> = matches
            .iter()
            .map(|m| self.resolve_public_name(m))
            .collect();

        let as_tools: Vec<Tool> = matches
            .iter()
            .map(|m| Tool {
                name: m.name.clone(),
                description: m.description.clone(),
                input_schema: m.input_schema.clone(),
                backend_id: m.backend_id.clone(),
                token_count: m.token_count,
            })
            .collect();
        let (returned_tokens, tokens_saved, savings_percent) =
            token_metrics(self.baseline_tokens, &as_tools);

        self.observability
            .record_find_tool(self.baseline_tokens, returned_tokens, tokens_saved);

        let metrics = TokenMetrics {
            baseline_tokens: self.baseline_tokens,
            returned_tokens,
            tokens_saved,
            savings_percent,
        };
        Ok((resolved, metrics))
    }

    fn resolve_public_name(&self, m: &ToolMatch) -> ToolSearchResult {
        let public_name = self
            .routing
            .lookup_by_backend(&m.backend_id, &m.name)
            .unwrap_or_else(|| m.name.clone());
        ToolSearchResult {
            public_name,
            description: m.description.clone(),
            input_schema: m.input_schema.clone(),
            backend_id: m.backend_id.clone(),
            score: m.score,
            token_count: m.token_count,
        }
    }

    #[instrument(skip(self, parameters, cancellation))]
    pub async fn call_tool(
        &self,
        public_name: &str,
        backend_id: Option<&str>,
        parameters: serde_json::Value,
        cancellation: &CancellationToken,
    ) -> OptimizerResult<ToolCallResult> {
        if cancellation.is_cancelled() {
            return Err(OptimizerError::Canceled);
        }
        if public_name.trim().is_empty() {
            return Err(OptimizerError::invalid("tool_name must not be empty"));
        }
        if !parameters.is_object() {
            return Err(OptimizerError::invalid("parameters must be a JSON object"));
        }

        let route = self.routing.resolve(public_name)?;
        if let Some(expected) = backend_id {
            if !expected.is_empty() && expected != route.backend_id {
                return Err(OptimizerError::invalid(format!(
                    "tool {public_name} belongs to backend {}, not {expected}",
                    route.backend_id
                )));
            }
        }

        let target = Backend {
            id: route.backend_id.clone(),
            name: route.backend_id.clone(),
            base_url: String::new(),
            transport_type: String::new(),
        };
        let target = (&target).into();

        let started = Instant::now();
        let result = tokio::select! {
            result = self.client.call_tool(&target, &route.internal_name, parameters) => result,
            () = cancellation.cancelled() => return Err(OptimizerError::Canceled),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(call_result) => {
                self.observability
                    .record_call(&route.backend_id, &route.internal_name, !call_result.is_error, elapsed_ms);
                Ok(ToolCallResult {
                    content: call_result.content.into_iter().map(translate_content).collect(),
                    is_error: call_result.is_error,
                })
            }
            Err(e) => {
                self.observability
                    .record_call(&route.backend_id, &route.internal_name, false, elapsed_ms);
                Ok(ToolCallResult {
                    content: vec![ResultContent::Text(e.to_string())],
                    is_error: true,
                })
            }
        }
    }
}

fn translate_content(content: BackendContent) -> ResultContent {
    match content {
        BackendContent::Text(text) => ResultContent::Text(text),
        BackendContent::Image { data, mime_type } => ResultContent::Image { data, mime_type },
        BackendContent::Audio { data, mime_type } => ResultContent::Audio { data, mime_type },
        BackendContent::Resource { uri, mime_type, body } => ResultContent::Resource { uri, mime_type, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCallResult, BackendTarget};
    use crate::routing::RoutingEntry;
    use crate::store::InMemoryToolStore;
    use async_trait::async_trait;

    struct FakeClient;

    #[async_trait]
    impl BackendClient for FakeClient {
        async fn list_capabilities(
            &self,
            _target: &BackendTarget,
        ) -> OptimizerResult<Vec<crate::backend::BackendTool>> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            _target: &BackendTarget,
            name: &str,
            _parameters: serde_json::Value,
        ) -> OptimizerResult<BackendCallResult> {
            if name == "explode" {
                return Err(OptimizerError::BackendUnavailable("fs".to_string()));
            }
            Ok(BackendCallResult {
                content: vec![BackendContent::Text(format!("called {name}"))],
                is_error: false,
            })
        }
    }

    async fn session_with(tools: Vec<(&str, &str)>) -> OptimizerSession {
        let store: Arc<dyn ToolStore> = Arc::new(InMemoryToolStore::new(None, 0.0, None));
        let routing = Arc::new(RoutingTable::new());
        for (name, _) in &tools {
            routing.insert(RoutingEntry::new(name.to_string(), "fs"));
        }
        let client: Arc<dyn BackendClient> = Arc::new(FakeClient);
        let observability = Arc::new(Observability::new());
        let visible = tools
            .into_iter()
            .map(|(n, d)| (n.to_string(), d.to_string(), serde_json::json!({})))
            .collect();
        OptimizerSession::new(
            store,
            routing,
            client,
            observability,
            &TokenCounter::default(),
            "fs",
            visible,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn find_tool_rejects_empty_description() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        assert!(session.find_tool("", None, None, &token).await.is_err());
    }

    #[tokio::test]
    async fn find_tool_returns_resolved_public_names_and_savings() {
        let session = session_with(vec![
            ("read_file", "reads a file from disk"),
            ("write_file", "writes a file to disk"),
        ])
        .await;
        let token = CancellationToken::new();
        let (matches, metrics) = session
            .find_tool("read a file", None, Some(1), &token)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].public_name, "read_file");
        assert_eq!(metrics.tokens_saved + metrics.returned_tokens, metrics.baseline_tokens);
    }

    #[tokio::test]
    async fn find_tool_honors_pre_cancelled_token() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        token.cancel();
        let result = session.find_tool("read a file", None, None, &token).await;
        assert!(matches!(result, Err(OptimizerError::Canceled)));
    }

    #[tokio::test]
    async fn call_tool_rejects_empty_name() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        assert!(session
            .call_tool("", None, serde_json::json!({}), &token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn call_tool_rejects_non_object_parameters() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        assert!(session
            .call_tool("read_file", None, serde_json::json!("nope"), &token)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn call_tool_rejects_mismatched_backend_id() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        let result = session
            .call_tool("read_file", Some("other_backend"), serde_json::json!({}), &token)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn call_tool_dispatches_and_returns_content() {
        let session = session_with(vec![("read_file", "reads a file")]).await;
        let token = CancellationToken::new();
        let result = session
            .call_tool("read_file", Some("fs"), serde_json::json!({}), &token)
            .await
            .unwrap();
        assert!(!result.is_error);
        match &result.content[0] {
            ResultContent::Text(text) => assert!(text.contains("read_file")),
            _ => panic!("expected text content"),
        }
    }

    #[tokio::test]
    async fn call_tool_backend_error_surfaces_as_tool_error_not_transport_failure() {
        let store: Arc<dyn ToolStore> = Arc::new(InMemoryToolStore::new(None, 0.0, None));
        let routing = Arc::new(RoutingTable::new());
        routing.insert(RoutingEntry::new("explode", "fs"));
        let client: Arc<dyn BackendClient> = Arc::new(FakeClient);
        let observability = Arc::new(Observability::new());
        let session = OptimizerSession::new(
            store,
            routing,
            client,
            observability,
            &TokenCounter::default(),
            "fs",
            vec![("explode".to_string(), "boom".to_string(), serde_json::json!({}))],
        )
        .await
        .unwrap();

        let token = CancellationToken::new();
        let result = session
            .call_tool("explode", None, serde_json::json!({}), &token)
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn unresolvable_route_in_find_tool_falls_back_to_stored_name() {
        let store: Arc<dyn ToolStore> = Arc::new(InMemoryToolStore::new(None, 0.0, None));
        let routing = Arc::new(RoutingTable::new());
        let client: Arc<dyn BackendClient> = Arc::new(FakeClient);
        let observability = Arc::new(Observability::new());
        let session = OptimizerSession::new(
            store,
            routing,
            client,
            observability,
            &TokenCounter::default(),
            "fs",
            vec![("read_file".to_string(), "reads a file".to_string(), serde_json::json!({}))],
        )
        .await
        .unwrap();

        let token = CancellationToken::new();
        let (matches, _) = session.find_tool("read a file", None, None, &token).await.unwrap();
        assert_eq!(matches[0].public_name, "read_file");
    }
}
