//! Resource: occupancy://sessions

use serde_json::json;
use store_counter::SessionRegistry;

use crate::types::{McpResult, ReadResourceResult, ResourceContent};

pub async fn read_sessions(registry: &SessionRegistry) -> McpResult<ReadResourceResult> {
    let sessions = registry.list();
    let live = sessions.iter().filter(|s| s.live).count();

    let content = json!({
        "session_count": sessions.len(),
        "live_count": live,
        "window_ms": registry.config().window_ms,
        "sessions": sessions,
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json("occupancy://sessions", &content)],
    })
}
