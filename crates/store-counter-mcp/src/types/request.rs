//! Request parameters: MCP method params plus the arguments shared by the occupancy tools.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{McpError, McpResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Arguments of every tool that addresses exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArgs {
    pub session_id: String,
}

/// Decode required method params; `what` names the method in the error.
pub fn parse_params<T: DeserializeOwned>(params: Option<Value>, what: &str) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParams(format!("{what} params required")))?;
    parse_args(params)
}

/// Decode tool or prompt arguments, mapping schema mismatches to `InvalidParams`.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> McpResult<T> {
    serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))
}
