//! Meta-Tool Handlers (C7): builds the `find_tool`/`call_tool` definitions
//! and translates MCP call arguments into [`OptimizerSession`] calls and
//! back into [`CallToolResult`]s.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, ResourceContents, Tool};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::ResourceBody;
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::session::{OptimizerSession, ResultContent, ToolSearchResult};

fn json_object(value: serde_json::Value) -> std::sync::Arc<serde_json::Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Object(map) => std::sync::Arc::new(map),
        _ => std::sync::Arc::new(serde_json::Map::new()),
    }
}

/// Build the `find_tool` and `call_tool` tool definitions advertised to
/// MCP clients, named per the configured public names.
pub fn build_meta_tools(config: &OptimizerConfig) -> Vec<Tool> {
    vec![
        Tool {
            name: Cow::Owned(config.find_tool_name.clone()),
            title: Some(Cow::Borrowed("Find Tool")),
            description: Some(Cow::Borrowed(
                "Search the available tool catalog by natural-language description and optional keywords, \
                 returning the best-matching tools instead of the full catalog.",
            )),
            input_schema: json_object(serde_json::json!({
                "type": "object",
                "properties": {
                    "tool_description": {
                        "type": "string",
                        "description": "Natural-language description of the capability needed"
                    },
                    "tool_keywords": {
                        "type": "string",
                        "description": "Optional extra keywords to bias the search"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of tools to return (default 10, max 50)"
                    }
                },
                "required": ["tool_description"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
        Tool {
            name: Cow::Owned(config.call_tool_name.clone()),
            title: Some(Cow::Borrowed("Call Tool")),
            description: Some(Cow::Borrowed(
                "Invoke a tool previously surfaced by find_tool, by its public name.",
            )),
            input_schema: json_object(serde_json::json!({
                "type": "object",
                "properties": {
                    "backend_id": {
                        "type": "string",
                        "description": "Optional backend id to verify the tool belongs to"
                    },
                    "tool_name": {
                        "type": "string",
                        "description": "The public tool name returned by find_tool"
                    },
                    "parameters": {
                        "type": "object",
                        "description": "Arguments to pass to the tool"
                    }
                },
                "required": ["tool_name", "parameters"]
            })),
            output_schema: None,
            annotations: None,
            icons: None,
        },
    ]
}

struct FindToolArgs {
    tool_description: String,
    tool_keywords: Option<String>,
    limit: Option<u32>,
}

fn parse_find_tool_args(arguments: serde_json::Value) -> OptimizerResult<FindToolArgs> {
    let object = arguments
        .as_object()
        .ok_or_else(|| OptimizerError::invalid("find_tool arguments must be a JSON object"))?;

    let tool_description = object
        .get("tool_description")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OptimizerError::invalid("tool_description is required"))?
        .to_string();

    let tool_keywords = object
        .get("tool_keywords")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let limit = object.get("limit").and_then(|v| v.as_u64()).map(|v| v as u32);

    Ok(FindToolArgs {
        tool_description,
        tool_keywords,
        limit,
    })
}

struct CallToolArgs {
    backend_id: Option<String>,
    tool_name: String,
    parameters: serde_json::Value,
}

fn parse_call_tool_args(arguments: serde_json::Value) -> OptimizerResult<CallToolArgs> {
    let object = arguments
        .as_object()
        .ok_or_else(|| OptimizerError::invalid("call_tool arguments must be a JSON object"))?;

    let backend_id = object
        .get("backend_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let tool_name = object
        .get("tool_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OptimizerError::invalid("tool_name is required"))?
        .to_string();

    let parameters = object
        .get("parameters")
        .cloned()
        .ok_or_else(|| OptimizerError::invalid("parameters is required"))?;

    Ok(CallToolArgs {
        backend_id,
        tool_name,
        parameters,
    })
}

fn error_result(message: impl std::fmt::Display) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message.to_string())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

fn search_result_to_json(result: &ToolSearchResult) -> serde_json::Value {
    serde_json::json!({
        "name": result.public_name,
        "description": result.description,
        "input_schema": result.input_schema,
        "backend_id": result.backend_id,
        "similarity_score": result.score,
        "token_count": result.token_count,
    })
}

/// Handle one `find_tool` invocation. Argument parsing errors and session
/// errors both surface as `is_error=true` tool results rather than
/// propagating as transport-level failures.
pub async fn handle_find_tool(
    session: &OptimizerSession,
    arguments: serde_json::Value,
    cancellation: &CancellationToken,
) -> CallToolResult {
    let args = match parse_find_tool_args(arguments) {
        Ok(args) => args,
        Err(e) => return error_result(e),
    };

    match session
        .find_tool(&args.tool_description, args.tool_keywords.as_deref(), args.limit, cancellation)
        .await
    {
        Ok((matches, metrics)) => {
            let tools_json: Vec<serde_json::Value> = matches.iter().map(search_result_to_json).collect();
            let structured = serde_json::json!({
                "tools": tools_json,
                "token_metrics": {
                    "baseline_tokens": metrics.baseline_tokens,
                    "returned_tokens": metrics.returned_tokens,
                    "tokens_saved": metrics.tokens_saved,
                    "savings_percentage": metrics.savings_percent,
                },
            });
            let summary = format!(
                "Found {} tool(s); {:.1}% token savings versus the full catalog.",
                matches.len(),
                metrics.savings_percent
            );
            CallToolResult {
                content: vec![Content::text(summary)],
                structured_content: Some(structured),
                is_error: Some(false),
                meta: None,
            }
        }
        Err(e) => error_result(e),
    }
}

fn translate_result_content(content: ResultContent) -> Content {
    match content {
        ResultContent::Text(text) => Content::text(text),
        ResultContent::Image { data, mime_type } => Content::image(data, mime_type),
        ResultContent::Resource { uri, mime_type, body } => {
            let contents = match body {
                ResourceBody::Text(text) => ResourceContents::TextResourceContents { uri, mime_type, text },
                ResourceBody::Blob(blob) => ResourceContents::BlobResourceContents { uri, mime_type, blob },
            };
            Content::resource(contents)
        }
        ResultContent::Audio { mime_type, .. } => {
            warn!(mime_type = %mime_type, "audio content has no direct MCP representation here; degrading to text");
            Content::text(format!("[audio: {mime_type}]"))
        }
    }
}

/// Handle one `call_tool` invocation.
pub async fn handle_call_tool(
    session: &OptimizerSession,
    arguments: serde_json::Value,
    cancellation: &CancellationToken,
) -> CallToolResult {
    let args = match parse_call_tool_args(arguments) {
        Ok(args) => args,
        Err(e) => return error_result(e),
    };

    match session
        .call_tool(&args.tool_name, args.backend_id.as_deref(), args.parameters, cancellation)
        .await
    {
        Ok(result) => CallToolResult {
            content: result.content.into_iter().map(translate_result_content).collect(),
            structured_content: None,
            is_error: Some(result.is_error),
            meta: None,
        },
        Err(e) => error_result(e),
    }
}

/// Dispatch by public meta-tool name. Returns `None` if `name` is not one
/// of the two registered meta-tools.
pub async fn dispatch(
    config: &OptimizerConfig,
    session: &OptimizerSession,
    name: &str,
    arguments: serde_json::Value,
    cancellation: &CancellationToken,
) -> Option<CallToolResult> {
    if name == config.find_tool_name {
        Some(handle_find_tool(session, arguments, cancellation).await)
    } else if name == config.call_tool_name {
        Some(handle_call_tool(session, arguments, cancellation).await)
    } else {
        None
    }
}
