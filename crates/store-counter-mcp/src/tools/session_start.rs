//! Tool: session_start, open a counting session for a video source.

use serde::Deserialize;
use serde_json::{json, Value};
use store_counter::{SessionRegistry, SourceKind};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition, parse_args};

#[derive(Debug, Deserialize)]
struct StartParams {
    #[serde(default = "default_source")]
    source: String,
}

fn default_source() -> String {
    "webcam".to_string()
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "session_start".to_string(),
        description: Some("Start a new counting session for a webcam or uploaded video".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "enum": ["webcam", "upload"],
                    "default": "webcam"
                }
            }
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: StartParams = parse_args(args)?;
    let source: SourceKind = params.source.parse().map_err(McpError::InvalidParams)?;

    let session = registry.start_session(source)?;

    Ok(ToolCallResult::json(&json!({
        "session_id": session.id(),
        "source": source,
        "window_ms": registry.config().window_ms,
        "status": "started"
    })))
}
