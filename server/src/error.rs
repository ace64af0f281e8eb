//! Error types for the listing server.

use listing_retrieval::RetrievalError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::protocol::JsonRpcError;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Stable snake_case name used in tool error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Retrieval(e) => e.kind(),
            ServerError::InvalidParams(_) => "invalid_params",
            ServerError::UnknownTool(_) => "unknown_tool",
            ServerError::Task(_) => "task_failed",
            ServerError::Json(_) => "json_error",
            ServerError::Io(_) => "io_error",
        }
    }

    /// Structured `{kind, message}` payload for tool results
    pub fn payload(&self) -> Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }

    fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidParams(_)
                | ServerError::UnknownTool(_)
                | ServerError::Retrieval(RetrievalError::InvalidQuery(_))
        )
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Task(err.to_string())
    }
}

impl From<ServerError> for JsonRpcError {
    fn from(err: ServerError) -> Self {
        let data = Some(err.payload());
        let mut rpc = if err.is_invalid_params() {
            JsonRpcError::invalid_params(err.to_string())
        } else {
            JsonRpcError::internal_error(err.to_string())
        };
        rpc.data = data;
        rpc
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
