//! Tool: timeline_query, bucket states over a time range.

use serde::Deserialize;
use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

#[derive(Debug, Deserialize)]
struct RangeParams {
    session_id: String,
    from_ms: i64,
    to_ms: i64,
    #[serde(default)]
    counts_only: bool,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "timeline_query".to_string(),
        description: Some("Ordered bucket states overlapping [from_ms, to_ms)".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "from_ms": { "type": "integer" },
                "to_ms": { "type": "integer" },
                "counts_only": {
                    "type": "boolean",
                    "default": false,
                    "description": "Return only the present-count series"
                }
            },
            "required": ["session_id", "from_ms", "to_ms"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: RangeParams = parse_args(args)?;

    let session = lookup_session(registry, &params.session_id)?;
    let states = session.query().state_in_range(params.from_ms, params.to_ms)?;

    if params.counts_only {
        let counts: Vec<Value> = states
            .iter()
            .map(|s| {
                json!({
                    "start_ms": s.window.map(|w| w.start_ms),
                    "current_count": s.current_count,
                })
            })
            .collect();
        return Ok(ToolCallResult::json(&json!({
            "total": counts.len(),
            "counts": counts,
        })));
    }

    Ok(ToolCallResult::json(&json!({
        "total": states.len(),
        "states": states,
    })))
}
