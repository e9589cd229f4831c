//! JSON-RPC message validation and shared argument parsing.

use store_counter::SessionId;

use crate::types::{JsonRpcRequest, McpError, McpResult, JSONRPC_VERSION};

/// Validate that a JSON-RPC request is well-formed.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }

    if request.method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Parse a session id argument, mapping bad input to `InvalidParams`.
pub fn parse_session_id(raw: &str) -> McpResult<SessionId> {
    raw.parse()
        .map_err(|e| McpError::InvalidParams(format!("Invalid session_id '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    #[test]
    fn test_rejects_wrong_version() {
        let request = JsonRpcRequest {
            jsonrpc: "1.0".to_string(),
            id: RequestId::Number(1),
            method: "ping".to_string(),
            params: None,
        };
        assert!(matches!(
            validate_request(&request),
            Err(McpError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_session_id() {
        let id = SessionId::new();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_session_id("not-a-uuid"),
            Err(McpError::InvalidParams(_))
        ));
    }
}
