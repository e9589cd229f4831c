//! Tool: scene_current, the live scene state of a session.

use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, SessionArgs, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "scene_current".to_string(),
        description: Some(
            "Current people count and demographic breakdown of the open window".to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" }
            },
            "required": ["session_id"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: SessionArgs = parse_args(args)?;

    let session = lookup_session(registry, &params.session_id)?;
    Ok(ToolCallResult::json(&json!({
        "live": !session.is_closed(),
        "scene": session.current_scene(),
    })))
}
