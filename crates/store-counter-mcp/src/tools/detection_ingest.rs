//! Tool: detection_ingest, feed a batch of tracked detections into a session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use store_counter::{RawDetection, SessionRegistry};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition, parse_args};

use super::registry::lookup_session;

/// Largest batch accepted in one call.
pub const MAX_BATCH_EVENTS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct IngestParams {
    session_id: String,
    events: Vec<RawDetection>,
}

#[derive(Debug, Serialize)]
struct Rejection {
    index: usize,
    track_id: String,
    kind: &'static str,
    message: String,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "detection_ingest".to_string(),
        description: Some(
            "Ingest tracked person detections. Rejected events are reported, not fatal".to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "events": {
                    "type": "array",
                    "maxItems": MAX_BATCH_EVENTS,
                    "items": {
                        "type": "object",
                        "properties": {
                            "track_id": { "type": "string" },
                            "timestamp_ms": { "type": "integer", "description": "Milliseconds since session start" },
                            "age_band": { "type": "string", "description": "0-17, 18-34, 35-54 or 55+" },
                            "gender": { "type": "string", "description": "male, female or unknown" },
                            "bounding_box": {
                                "type": "object",
                                "properties": {
                                    "x": { "type": "number" },
                                    "y": { "type": "number" },
                                    "w": { "type": "number" },
                                    "h": { "type": "number" }
                                }
                            },
                            "confidence": { "type": "number" }
                        },
                        "required": ["track_id", "timestamp_ms", "age_band"]
                    }
                }
            },
            "required": ["session_id", "events"]
        }),
    }
}

pub async fn execute(args: Value, registry: &SessionRegistry) -> McpResult<ToolCallResult> {
    let params: IngestParams = parse_args(args)?;

    if params.events.len() > MAX_BATCH_EVENTS {
        return Err(McpError::ContentTooLarge {
            size: params.events.len(),
            max: MAX_BATCH_EVENTS,
        });
    }

    let session = lookup_session(registry, &params.session_id)?;

    let submitted = params.events.len();
    let mut accepted = 0usize;
    let mut new_tracks = 0usize;
    let mut sealed_buckets = 0usize;
    let mut rejections = Vec::new();

    for (index, raw) in params.events.into_iter().enumerate() {
        let track_id = raw.track_id.clone();
        match session.ingest_raw(raw) {
            Ok(receipt) => {
                accepted += 1;
                if receipt.is_new_track {
                    new_tracks += 1;
                }
                sealed_buckets += receipt.sealed_buckets;
            }
            Err(e) => rejections.push(Rejection {
                index,
                track_id,
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }

    let scene = session.current_scene();
    Ok(ToolCallResult::json(&json!({
        "submitted": submitted,
        "accepted": accepted,
        "rejected": rejections.len(),
        "new_tracks": new_tracks,
        "sealed_buckets": sealed_buckets,
        "current_count": scene.current_count,
        "total_count": scene.total_count,
        "rejections": rejections,
    })))
}
