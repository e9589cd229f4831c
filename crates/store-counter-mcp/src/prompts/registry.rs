//! Prompt registration and dispatch.

use serde_json::Value;
use store_counter::SessionRegistry;

use crate::types::{McpError, McpResult, PromptArgument, PromptDefinition, PromptGetResult};

use super::{report, scrub};

pub struct PromptRegistry;

impl PromptRegistry {
    pub fn list_prompts() -> Vec<PromptDefinition> {
        vec![
            PromptDefinition {
                name: "occupancy_report".to_string(),
                description: Some(
                    "Summarize footfall and demographics of a session".to_string(),
                ),
                arguments: Some(vec![PromptArgument {
                    name: "session_id".to_string(),
                    description: Some("Session UUID".to_string()),
                    required: true,
                }]),
            },
            PromptDefinition {
                name: "scrub_timeline".to_string(),
                description: Some("Guide for walking a session timeline".to_string()),
                arguments: Some(vec![
                    PromptArgument {
                        name: "session_id".to_string(),
                        description: Some("Session UUID".to_string()),
                        required: true,
                    },
                    PromptArgument {
                        name: "focus".to_string(),
                        description: Some("What to look for, e.g. peaks".to_string()),
                        required: false,
                    },
                ]),
            },
        ]
    }

    pub async fn get(
        name: &str,
        arguments: Option<Value>,
        registry: &SessionRegistry,
    ) -> McpResult<PromptGetResult> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            "occupancy_report" => report::expand(args, registry),
            "scrub_timeline" => scrub::expand(args, registry),
            _ => Err(McpError::PromptNotFound(name.to_string())),
        }
    }
}

/// Read the required `session_id` argument of a prompt.
pub(crate) fn session_arg(args: &Value) -> McpResult<&str> {
    args.get("session_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::InvalidParams("session_id is required".to_string()))
}
