//! Resource registration and dispatch.

use store_counter::SessionRegistry;

use crate::protocol::validator::parse_session_id;
use crate::types::{
    McpError, McpResult, ReadResourceResult, ResourceDefinition, ResourceTemplateDefinition,
};

use super::{scene, sessions, templates, timeline};

pub struct ResourceRegistry;

impl ResourceRegistry {
    pub fn list_templates() -> Vec<ResourceTemplateDefinition> {
        templates::list_templates()
    }

    pub fn list_resources() -> Vec<ResourceDefinition> {
        templates::list_resources()
    }

    pub async fn read(uri: &str, registry: &SessionRegistry) -> McpResult<ReadResourceResult> {
        if uri == "occupancy://sessions" {
            sessions::read_sessions(registry).await
        } else if let Some(rest) = uri.strip_prefix("occupancy://session/") {
            let (id_str, view) = rest.split_once('/').ok_or_else(|| {
                McpError::InvalidParams(
                    "Session URI must be occupancy://session/{id}/current or /totals".to_string(),
                )
            })?;
            let id = parse_session_id(id_str)?;
            match view {
                "current" => scene::read_current(id, registry).await,
                "totals" => scene::read_totals(id, registry).await,
                _ => Err(McpError::ResourceNotFound(uri.to_string())),
            }
        } else if let Some(rest) = uri.strip_prefix("occupancy://timeline/") {
            let parts: Vec<&str> = rest.split('/').collect();
            if parts.len() != 3 {
                return Err(McpError::InvalidParams(
                    "Timeline URI must be occupancy://timeline/{id}/{from}/{to}".to_string(),
                ));
            }
            let id = parse_session_id(parts[0])?;
            let from: i64 = parts[1]
                .parse()
                .map_err(|_| McpError::InvalidParams("Invalid from timestamp".to_string()))?;
            let to: i64 = parts[2]
                .parse()
                .map_err(|_| McpError::InvalidParams("Invalid to timestamp".to_string()))?;
            timeline::read_timeline(id, from, to, registry).await
        } else {
            Err(McpError::ResourceNotFound(uri.to_string()))
        }
    }
}
