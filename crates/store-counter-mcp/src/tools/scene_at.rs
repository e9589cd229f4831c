//! Tool: scene_at, the scene as it was at a past instant.

use serde::Deserialize;
use serde_json::Value;
use store_counter::SessionRegistry;

use crate::types::{McpResult, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

#[derive(Debug, Deserialize)]
struct AtParams {
    session_id: String,
    timestamp_ms: i64,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "scene_at".to_string(),
        description: Some("Scene state of the bucket containing a timestamp".to_string()),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "timestamp_ms": { "type": "integer", "description": "Milliseconds since session start" }
            },
            "required": ["session_id", "timestamp_ms"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: AtParams = parse_args(args)?;

    let session = lookup_session(registry, &params.session_id)?;
    let state = session.query().state_at(params.timestamp_ms)?;
    Ok(ToolCallResult::json(&state))
}
