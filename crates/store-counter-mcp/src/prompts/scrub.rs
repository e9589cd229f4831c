//! Prompt: scrub_timeline

use serde_json::Value;
use store_counter::SessionRegistry;

use crate::protocol::validator::parse_session_id;
use crate::types::{McpResult, PromptGetResult};

use super::registry::session_arg;

pub fn expand(args: Value, registry: &SessionRegistry) -> McpResult<PromptGetResult> {
    let id = parse_session_id(session_arg(&args)?)?;
    let session = registry.get(id)?;
    let focus = args.get("focus").and_then(|v| v.as_str()).unwrap_or("");

    let span = match session.query().recorded_span() {
        Some((start, end)) => format!("from {start}ms to {end}ms"),
        None => "with no recorded history yet".to_string(),
    };
    let focus_section = if focus.is_empty() {
        String::new()
    } else {
        format!("\nFocus: {focus}\n")
    };

    let text = format!(
        "Walk through the timeline of session {id}, recorded {span}.\n\
         {focus_section}\n\
         Please:\n\
         1. Call timeline_scrub at positions 0, 25, 50, 75 and 100\n\
         2. Where the count changes sharply, narrow in with scene_at\n\
         3. If a point reports compacted history, move forward to retained data"
    );

    Ok(PromptGetResult::user("Guide for scrubbing a session timeline", text))
}
