//! External interfaces the optimizer consumes (spec §6): a registry that
//! enumerates backend MCP servers, and a client that lists/dispatches their
//! tools. Both are trait boundaries — the real MCP transport connecting to
//! a backend is out of scope for this crate.

use async_trait::async_trait;

use crate::error::OptimizerResult;

/// One backend MCP server, as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub transport_type: String,
}

/// Addressing handle passed to [`BackendClient`] calls. Separate from
/// [`Backend`] because some clients need an established connection handle
/// rather than bare addressing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub backend_id: String,
    pub base_url: String,
    pub transport_type: String,
}

impl From<&Backend> for BackendTarget {
    fn from(backend: &Backend) -> Self {
        Self {
            backend_id: backend.id.clone(),
            base_url: backend.base_url.clone(),
            transport_type: backend.transport_type.clone(),
        }
    }
}

/// A discovered backend-side tool, prior to token counting or embedding.
#[derive(Debug, Clone)]
pub struct BackendTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The payload of a resource content block: either inline text or a
/// base64-encoded blob, mirroring MCP's `TextResourceContents` /
/// `BlobResourceContents` split.
#[derive(Debug, Clone)]
pub enum ResourceBody {
    Text(String),
    Blob(String),
}

/// One piece of content returned by a backend tool call.
#[derive(Debug, Clone)]
pub enum BackendContent {
    Text(String),
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    Resource {
        uri: String,
        mime_type: Option<String>,
        body: ResourceBody,
    },
}

/// The result of invoking a backend tool.
#[derive(Debug, Clone)]
pub struct BackendCallResult {
    pub content: Vec<BackendContent>,
    pub is_error: bool,
}

/// Enumerates backend MCP servers known to the deployment.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    async fn list(&self) -> OptimizerResult<Vec<Backend>>;
}

/// Talks to a single backend: discovers its tools and dispatches calls.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn list_capabilities(&self, target: &BackendTarget) -> OptimizerResult<Vec<BackendTool>>;

    async fn call_tool(
        &self,
        target: &BackendTarget,
        name: &str,
        parameters: serde_json::Value,
    ) -> OptimizerResult<BackendCallResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_target_from_backend() {
        let backend = Backend {
            id: "github".to_string(),
            name: "GitHub".to_string(),
            base_url: "https://mcp.github.example".to_string(),
            transport_type: "http".to_string(),
        };
        let target: BackendTarget = (&backend).into();
        assert_eq!(target.backend_id, "github");
        assert_eq!(target.base_url, backend.base_url);
    }
}
