//! Resources: occupancy://session/{id}/current and occupancy://session/{id}/totals

use serde_json::json;
use store_counter::{SessionId, SessionRegistry};

use crate::types::{McpResult, ReadResourceResult, ResourceContent};

pub async fn read_current(
    id: SessionId,
    registry: &SessionRegistry,
) -> McpResult<ReadResourceResult> {
    let session = registry.get(id)?;
    let content = json!({
        "live": !session.is_closed(),
        "scene": session.current_scene(),
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json(
            format!("occupancy://session/{id}/current"),
            &content,
        )],
    })
}

pub async fn read_totals(
    id: SessionId,
    registry: &SessionRegistry,
) -> McpResult<ReadResourceResult> {
    let session = registry.get(id)?;
    let totals = session.totals();
    let content = json!({
        "total_count": totals.total_count,
        "demographics": totals.breakdown(),
        "ingest": session.stats(),
        "log_failures": session.log_failures(),
    });

    Ok(ReadResourceResult {
        contents: vec![ResourceContent::json(
            format!("occupancy://session/{id}/totals"),
            &content,
        )],
    })
}
