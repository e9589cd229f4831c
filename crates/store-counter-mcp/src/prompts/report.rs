//! Prompt: occupancy_report, seeded with the session's current numbers.

use serde_json::Value;
use store_counter::{AgeBand, Gender, SessionRegistry};

use crate::protocol::validator::parse_session_id;
use crate::types::{McpResult, PromptGetResult, PromptMessage, ToolContent};

use super::registry::session_arg;

pub fn expand(args: Value, registry: &SessionRegistry) -> McpResult<PromptGetResult> {
    let id = parse_session_id(session_arg(&args)?)?;
    let session = registry.get(id)?;
    let totals = session.totals();
    let breakdown = totals.breakdown();
    let scene = session.current_scene();

    let ages: Vec<String> = AgeBand::ALL
        .iter()
        .map(|band| format!("{} {}%", band.label(), breakdown.age_percent(*band)))
        .collect();
    let genders: Vec<String> = Gender::REPORTED
        .iter()
        .map(|g| format!("{} {}%", g.label(), breakdown.gender_percent(*g)))
        .collect();

    let status = if session.is_closed() { "ended" } else { "live" };
    let text = format!(
        "Write a short occupancy report for {status} session {id} ({source}).\n\n\
         Unique visitors: {total}\n\
         Present now: {current}\n\
         Age mix: {ages}\n\
         Gender mix: {genders}\n\
         Unlabeled gender: {unlabeled}\n\n\
         Please:\n\
         1. Use timeline_query with counts_only to find the busiest windows\n\
         2. Call out which age band dominates and whether that shifts over time\n\
         3. Note any long empty stretches",
        source = session.source(),
        total = totals.total_count,
        current = scene.current_count,
        ages = ages.join(", "),
        genders = genders.join(", "),
        unlabeled = breakdown.unlabeled,
    );

    Ok(PromptGetResult {
        description: Some("Occupancy report for a counting session".to_string()),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: ToolContent::Text { text },
        }],
    })
}
