//! Server-level errors and their JSON-RPC codes.
//!
//! Tool failures are not in here: they travel inside a successful
//! `tools/call` reply as an error `ToolResult` with `isError` set.

use serde_json::{json, Value};

use msgops::{RemoteError, RemoteErrorKind};

use super::message::{JsonRpcErrorObject, JsonRpcReply, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Codes from the server-defined range.
pub mod mcp_error_codes {
    pub const CONTENT_TOO_LARGE: i32 = -32801;
    /// The configured messaging backend could not be reached or built.
    pub const BACKEND_UNAVAILABLE: i32 = -32850;
}

#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Message of {size} bytes exceeds the {max}-byte limit")]
    ContentTooLarge { size: usize, max: usize },

    /// Bad flags or environment; surfaces at start-up, not over the wire.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Messaging backend unavailable ({kind:?}): {message}")]
    Backend {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::Config(_) => INVALID_PARAMS,
            McpError::ContentTooLarge { .. } => CONTENT_TOO_LARGE,
            McpError::Backend { .. } => BACKEND_UNAVAILABLE,
            McpError::InternalError(_) | McpError::Transport(_) | McpError::Io(_) => {
                INTERNAL_ERROR
            }
        }
    }

    /// Structured detail for the `data` member of the error object.
    pub fn data(&self) -> Option<Value> {
        match self {
            McpError::ContentTooLarge { size, max } => Some(json!({ "size": size, "max": max })),
            McpError::Backend { kind, .. } => Some(json!({
                "kind": format!("{kind:?}"),
                "retryable": matches!(
                    kind,
                    RemoteErrorKind::Throttled | RemoteErrorKind::Transport | RemoteErrorKind::Timeout
                ),
            })),
            _ => None,
        }
    }

    pub fn to_reply(&self, id: RequestId) -> JsonRpcReply {
        JsonRpcReply::error(
            id,
            JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: self.data(),
            },
        )
    }
}

impl From<RemoteError> for McpError {
    fn from(e: RemoteError) -> Self {
        McpError::Backend {
            kind: e.kind,
            message: e.message,
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
