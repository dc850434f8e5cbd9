//! Optimizer error types.
//!
//! Defines the error taxonomy for tool search, ingestion, and dispatch:
//! invalid input, missing entities, unavailable remotes, timeouts,
//! cancellation, and internal faults.

use thiserror::Error;

pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Coarse-grained discriminant a caller can match on without inspecting
/// the error message, used to decide how `find_tool`/`call_tool` surface
/// a failure to the MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Unavailable,
    Timeout,
    Canceled,
    Internal,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("backend not found: {0}")]
    BackendNotFound(String),

    #[error("routing entry not found: {0}")]
    RouteNotFound(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation canceled")]
    Canceled,

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OptimizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizerError::Invalid(_) | OptimizerError::Config(_) | OptimizerError::Json(_) => {
                ErrorKind::Invalid
            }
            OptimizerError::ToolNotFound(_)
            | OptimizerError::BackendNotFound(_)
            | OptimizerError::RouteNotFound(_) => ErrorKind::NotFound,
            OptimizerError::EmbeddingUnavailable(_) | OptimizerError::BackendUnavailable(_) => {
                ErrorKind::Unavailable
            }
            OptimizerError::Timeout(_) => ErrorKind::Timeout,
            OptimizerError::Canceled => ErrorKind::Canceled,
            OptimizerError::Store(_) | OptimizerError::Http(_) | OptimizerError::Sql(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        OptimizerError::Invalid(msg.into())
    }
}
