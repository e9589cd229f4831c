//! Tool: scene_totals, cumulative unique visitors since session start.

use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, SessionArgs, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "scene_totals".to_string(),
        description: Some("Total unique people seen in a session, by age and gender".to_string()),
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
    let totals = session.totals();
    Ok(ToolCallResult::json(&json!({
        "total_count": totals.total_count,
        "demographics": totals.breakdown(),
        "ingest": session.stats(),
    })))
}
