//! Tool: session_list

use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "session_list".to_string(),
        description: Some("List live and ended sessions".to_string()),
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}

pub async fn execute(_args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let sessions = registry.list();
    Ok(ToolCallResult::json(&json!({
        "total": sessions.len(),
        "sessions": sessions,
    })))
}
