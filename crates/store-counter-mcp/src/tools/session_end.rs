//! Tool: session_end, seal the open bucket and stop ingestion.

use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, SessionArgs, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "session_end".to_string(),
        description: Some("End a counting session and return its summary".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session UUID" }
            },
            "required": ["session_id"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: SessionArgs = parse_args(args)?;

    let session = lookup_session(registry, &params.session_id)?;
    let summary = session.end();

    Ok(ToolCallResult::json(&json!({
        "status": "ended",
        "summary": summary,
        "demographics": summary.totals.breakdown(),
    })))
}
