//! Tool registration and dispatch.

use std::sync::Arc;

use serde_json::Value;
use store_counter::{OccupancySession, SessionRegistry};

use crate::protocol::validator::parse_session_id;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{
    detection_ingest, scene_at, scene_current, scene_totals, session_end, session_list,
    session_start, timeline_query, timeline_scrub,
};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![
            session_start::definition(),
            session_end::definition(),
            session_list::definition(),
            detection_ingest::definition(),
            scene_current::definition(),
            scene_totals::definition(),
            scene_at::definition(),
            timeline_query::definition(),
            timeline_scrub::definition(),
        ]
    }

    pub async fn call(
        name: &str,
        arguments: Option<Value>,
        registry: &SessionRegistry,
    ) -> McpResult<ToolCallResult> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            "session_start" => session_start::execute(args, registry).await,
            "session_end" => session_end::execute(args, registry).await,
            "session_list" => session_list::execute(args, registry).await,
            "detection_ingest" => detection_ingest::execute(args, registry).await,
            "scene_current" => scene_current::execute(args, registry).await,
            "scene_totals" => scene_totals::execute(args, registry).await,
            "scene_at" => scene_at::execute(args, registry).await,
            "timeline_query" => timeline_query::execute(args, registry).await,
            "timeline_scrub" => timeline_scrub::execute(args, registry).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

/// Resolve a `session_id` argument to its live or ended session.
pub(crate) fn lookup_session(
    registry: &SessionRegistry,
    session_id: &str,
) -> McpResult<Arc<OccupancySession>> {
    let id = parse_session_id(session_id)?;
    Ok(registry.get(id)?)
}
