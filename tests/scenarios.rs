//! End-to-end scenarios covering a session's full find_tool/call_tool path
//! against an in-memory store and a fake backend.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vmcp_optimizer::{
    Backend, BackendCallResult, BackendClient, BackendContent, BackendTarget, BackendTool,
    InMemoryToolStore, Observability, OptimizerError, OptimizerSession, OptimizerResult,
    RoutingEntry, RoutingTable, TokenCounter, ToolStore,
};

struct FakeClient;

#[async_trait]
impl BackendClient for FakeClient {
    async fn list_capabilities(&self, _target: &BackendTarget) -> OptimizerResult<Vec<BackendTool>> {
        Ok(Vec::new())
    }

    async fn call_tool(
        &self,
        target: &BackendTarget,
        name: &str,
        parameters: serde_json::Value,
    ) -> OptimizerResult<BackendCallResult> {
        Ok(BackendCallResult {
            content: vec![BackendContent::Text(format!(
                "{}::{name}({parameters})",
                target.backend_id
            ))],
            is_error: false,
        })
    }
}

async fn session_over(tools: Vec<(&str, &str)>) -> (OptimizerSession, Arc<RoutingTable>) {
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
    let session = OptimizerSession::new(
        Arc::clone(&store),
        Arc::clone(&routing),
        client,
        observability,
        &TokenCounter::default(),
        "fs",
        visible,
    )
    .await
    .unwrap();
    (session, routing)
}

#[tokio::test]
async fn s1_empty_description_is_invalid() {
    let (session, _) = session_over(vec![("fetch_url", "fetch a url")]).await;
    let token = CancellationToken::new();
    let err = session.find_tool("", None, None, &token).await.unwrap_err();
    assert!(matches!(err, OptimizerError::Invalid(_)));
}

#[tokio::test]
async fn s2_substring_match_over_three_tools() {
    let (session, _) = session_over(vec![
        ("fetch_url", "fetch a url from the web"),
        ("read_file", "read a file from disk"),
        ("write_file", "write a file to disk"),
    ])
    .await;
    let token = CancellationToken::new();
    let (matches, metrics) = session.find_tool("file", None, None, &token).await.unwrap();
    let names: Vec<&str> = matches.iter().map(|m| m.public_name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"read_file"));
    assert!(names.contains(&"write_file"));
    assert!(metrics.baseline_tokens > 0);
    assert!(metrics.returned_tokens > 0);
}

#[tokio::test]
async fn s3_case_insensitive_match() {
    let (session, _) = session_over(vec![
        ("fetch_url", "fetch a url from the web"),
        ("read_file", "read a file from disk"),
        ("write_file", "write a file to disk"),
    ])
    .await;
    let token = CancellationToken::new();
    let (matches, _) = session.find_tool("FETCH", None, None, &token).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].public_name, "fetch_url");
}

#[tokio::test]
async fn s4_no_matches_returns_empty_with_full_savings() {
    let (session, _) = session_over(vec![("fetch_url", "fetch a url from the web")]).await;
    let token = CancellationToken::new();
    let (matches, metrics) = session
        .find_tool("nonexistent", None, None, &token)
        .await
        .unwrap();
    assert!(matches.is_empty());
    assert_eq!(metrics.returned_tokens, 0);
    assert_eq!(metrics.savings_percent, 100.0);
}

#[tokio::test]
async fn s5_allow_list_scoping_across_sessions() {
    let store: Arc<dyn ToolStore> = Arc::new(InMemoryToolStore::new(None, 0.0, None));
    let routing = Arc::new(RoutingTable::new());
    routing.insert(RoutingEntry::new("alpha", "svc"));
    routing.insert(RoutingEntry::new("beta", "svc"));
    let client: Arc<dyn BackendClient> = Arc::new(FakeClient);
    let observability = Arc::new(Observability::new());

    let session_a = OptimizerSession::new(
        Arc::clone(&store),
        Arc::clone(&routing),
        Arc::clone(&client),
        Arc::clone(&observability),
        &TokenCounter::default(),
        "svc",
        vec![("alpha".to_string(), "alpha tool".to_string(), serde_json::json!({}))],
    )
    .await
    .unwrap();

    let session_b = OptimizerSession::new(
        store,
        routing,
        client,
        observability,
        &TokenCounter::default(),
        "svc",
        vec![("beta".to_string(), "beta tool".to_string(), serde_json::json!({}))],
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let (matches_a, _) = session_a.find_tool("tool", None, None, &token).await.unwrap();
    let (matches_b, _) = session_b.find_tool("tool", None, None, &token).await.unwrap();

    assert_eq!(matches_a.len(), 1);
    assert_eq!(matches_a[0].public_name, "alpha");
    assert_eq!(matches_b.len(), 1);
    assert_eq!(matches_b[0].public_name, "beta");
}

#[tokio::test]
async fn s6_call_dispatch_resolves_rename_and_propagates_content() {
    let store: Arc<dyn ToolStore> = Arc::new(InMemoryToolStore::new(None, 0.0, None));
    let routing = Arc::new(RoutingTable::new());
    routing.insert(RoutingEntry::new("gh_pr_read", "github").with_rename("pull_request_read"));
    let client: Arc<dyn BackendClient> = Arc::new(FakeClient);
    let observability = Arc::new(Observability::new());
    let session = OptimizerSession::new(
        store,
        routing,
        client,
        observability,
        &TokenCounter::default(),
        "github",
        vec![(
            "gh_pr_read".to_string(),
            "reads a pull request".to_string(),
            serde_json::json!({}),
        )],
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let result = session
        .call_tool("gh_pr_read", None, serde_json::json!({"n": 1}), &token)
        .await
        .unwrap();

    assert!(!result.is_error);
    match &result.content[0] {
        vmcp_optimizer::ResultContent::Text(text) => {
            assert!(text.contains("github::pull_request_read"));
        }
        _ => panic!("expected text content"),
    }
}

#[test]
fn backend_target_round_trips_addressing_fields() {
    let backend = Backend {
        id: "github".to_string(),
        name: "GitHub".to_string(),
        base_url: "https://mcp.github.example".to_string(),
        transport_type: "http".to_string(),
    };
    let target: BackendTarget = (&backend).into();
    assert_eq!(target.backend_id, backend.id);
    assert_eq!(target.base_url, backend.base_url);
}
