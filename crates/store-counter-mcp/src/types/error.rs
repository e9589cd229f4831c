//! Error types and JSON-RPC error codes for the MCP server.

use serde_json::{json, Value};
use store_counter::{CounterError, IngestError, QueryError};

use super::message::{JsonRpcError, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP and occupancy-specific error codes.
pub mod mcp_error_codes {
    pub const CONTENT_TOO_LARGE: i32 = -32801;
    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const PROMPT_NOT_FOUND: i32 = -32804;

    pub const SESSION_NOT_FOUND: i32 = -32851;
    pub const COUNTER_ERROR: i32 = -32852;
    pub const OUT_OF_RANGE: i32 = -32853;
    pub const NOT_YET_RECORDED: i32 = -32854;
    pub const COMPACTED: i32 = -32855;
    pub const INGEST_REJECTED: i32 = -32856;

    /// Server: missing or invalid bearer token.
    pub const UNAUTHORIZED: i32 = -32900;
    /// Server: missing X-User-ID header in multi-tenant mode.
    pub const USER_NOT_FOUND: i32 = -32901;
}

/// All errors that can occur in the MCP server.
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

    #[error("Content too large: {size} events exceeds {max}")]
    ContentTooLarge { size: usize, max: usize },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Counter error: {0}")]
    Counter(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User not found: {0}")]
    UserNotFound(String),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::ContentTooLarge { .. } => CONTENT_TOO_LARGE,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::PromptNotFound(_) => PROMPT_NOT_FOUND,
            McpError::SessionNotFound(_) => SESSION_NOT_FOUND,
            McpError::Query(QueryError::OutOfRange { .. }) => OUT_OF_RANGE,
            McpError::Query(QueryError::NotYetRecorded { .. }) => NOT_YET_RECORDED,
            McpError::Query(QueryError::Compacted { .. }) => COMPACTED,
            McpError::Query(QueryError::InvalidRange { .. }) => INVALID_PARAMS,
            McpError::Ingest(_) => INGEST_REJECTED,
            McpError::Counter(_) => COUNTER_ERROR,
            McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
            McpError::Unauthorized => UNAUTHORIZED,
            McpError::UserNotFound(_) => USER_NOT_FOUND,
        }
    }

    /// Structured detail for domain errors, sent as the error's `data`.
    pub fn data(&self) -> Option<Value> {
        match self {
            McpError::Query(QueryError::NotYetRecorded {
                timestamp_ms,
                latest_ms,
            }) => Some(json!({
                "kind": "not_yet_recorded",
                "timestamp_ms": timestamp_ms,
                "latest_ms": latest_ms,
            })),
            McpError::Query(QueryError::Compacted {
                timestamp_ms,
                compacted_until_ms,
            }) => Some(json!({
                "kind": "compacted",
                "timestamp_ms": timestamp_ms,
                "compacted_until_ms": compacted_until_ms,
            })),
            McpError::Query(QueryError::OutOfRange { timestamp_ms }) => Some(json!({
                "kind": "out_of_range",
                "timestamp_ms": timestamp_ms,
            })),
            McpError::Ingest(e) => Some(json!({ "kind": e.kind() })),
            _ => None,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        let error = JsonRpcError::new(id, self.code(), self.to_string());
        match self.data() {
            Some(data) => error.with_data(data),
            None => error,
        }
    }
}

impl From<CounterError> for McpError {
    fn from(e: CounterError) -> Self {
        match e {
            CounterError::SessionNotFound(id) => McpError::SessionNotFound(id.to_string()),
            CounterError::Query(q) => McpError::Query(q),
            CounterError::Ingest(i) => McpError::Ingest(i),
            CounterError::Io(io) => McpError::Io(io),
            other => McpError::Counter(other.to_string()),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use store_counter::SessionId;

    #[test]
    fn test_counter_errors_keep_their_codes() {
        let id = SessionId::new();
        let err: McpError = CounterError::SessionNotFound(id).into();
        assert_eq!(err.code(), mcp_error_codes::SESSION_NOT_FOUND);

        let err: McpError = CounterError::Query(QueryError::NotYetRecorded {
            timestamp_ms: 50_000,
            latest_ms: Some(40_000),
        })
        .into();
        assert_eq!(err.code(), mcp_error_codes::NOT_YET_RECORDED);
        assert_eq!(err.data().unwrap()["latest_ms"], 40_000);

        let err: McpError = CounterError::Storage("disk full".into()).into();
        assert_eq!(err.code(), mcp_error_codes::COUNTER_ERROR);
    }

    #[test]
    fn test_invalid_range_is_invalid_params() {
        let err = McpError::Query(QueryError::InvalidRange {
            from_ms: 10,
            to_ms: 0,
        });
        assert_eq!(err.code(), error_codes::INVALID_PARAMS);
        assert!(err.data().is_none());
    }
}
