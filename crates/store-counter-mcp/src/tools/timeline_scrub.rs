//! Tool: timeline_scrub, map a slider position onto recorded history.

use serde::Deserialize;
use serde_json::{json, Value};
use store_counter::SessionRegistry;

use crate::types::{McpResult, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

#[derive(Debug, Deserialize)]
struct ScrubParams {
    session_id: String,
    position: u64,
    #[serde(default = "default_steps")]
    steps: u64,
}

fn default_steps() -> u64 {
    100
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "timeline_scrub".to_string(),
        description: Some(
            "Scene state at slider position 0..=steps across the recorded span".to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "position": { "type": "integer", "minimum": 0 },
                "steps": { "type": "integer", "minimum": 1, "default": 100 }
            },
            "required": ["session_id", "position"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: ScrubParams = parse_args(args)?;

    let session = lookup_session(registry, &params.session_id)?;
    let query = session.query();
    let state = query.scrub(params.position, params.steps)?;
    let span = query.recorded_span();

    Ok(ToolCallResult::json(&json!({
        "position": params.position.min(params.steps),
        "steps": params.steps,
        "span_ms": span.map(|(start, end)| json!({ "start_ms": start, "end_ms": end })),
        "state": state,
    })))
}
