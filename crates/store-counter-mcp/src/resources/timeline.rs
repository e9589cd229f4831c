//! Resource: occupancy://timeline/{id}/{from}/{to}

use serde_json::json;
use store_counter::{SessionId, SessionRegistry};

use crate::types::{McpResult, ReadResourceResult, ResourceContent};

pub async fn read_timeline(
    id: SessionId,
    from_ms: i64,
    to_ms: i64,
    registry: &SessionRegistry,
) -> McpResult<ReadResourceResult> {
    let session = registry.get(id)?;
    let states = session.query().state_in_range(from_ms, to_ms)?;
    let compacted = session.timeline().compacted();

    let content = json!({
        "session_id": id,
        "from_ms": from_ms,
        "to_ms": to_ms,
        "bucket_count": states.len(),
        "compacted": compacted,
        "states": states,
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json(
            format!("occupancy://timeline/{id}/{from_ms}/{to_ms}"),
            &content,
        )],
    })
}
