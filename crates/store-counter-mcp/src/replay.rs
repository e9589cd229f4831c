//! Offline replay of recorded detections (one JSON object per line).

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use store_counter::{OccupancySession, RawDetection, SessionRegistry, SessionSummary, SourceKind};

use crate::types::McpResult;

/// Outcome of replaying one detection file.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub lines: u64,
    pub accepted: u64,
    /// Rejected events by kind. Unparseable lines count as `corrupt_event`.
    pub rejected: BTreeMap<String, u64>,
    pub new_tracks: u64,
    pub summary: SessionSummary,
    pub replayed_at: DateTime<Utc>,
}

impl ReplayReport {
    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }
}

/// Feed every line of `reader` into `session`, then end it.
pub fn replay_reader<R: BufRead>(session: &OccupancySession, reader: R) -> McpResult<ReplayReport> {
    let mut lines = 0u64;
    let mut accepted = 0u64;
    let mut new_tracks = 0u64;
    let mut rejected: BTreeMap<String, u64> = BTreeMap::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines += 1;

        let raw: RawDetection = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Line {}: unparseable detection: {e}", number + 1);
                *rejected.entry("corrupt_event".to_string()).or_default() += 1;
                continue;
            }
        };

        match session.ingest_raw(raw) {
            Ok(receipt) => {
                accepted += 1;
                if receipt.is_new_track {
                    new_tracks += 1;
                }
            }
            Err(e) => {
                tracing::debug!("Line {}: {e}", number + 1);
                *rejected.entry(e.kind().to_string()).or_default() += 1;
            }
        }
    }

    let summary = session.end();
    Ok(ReplayReport {
        lines,
        accepted,
        rejected,
        new_tracks,
        summary,
        replayed_at: Utc::now(),
    })
}

/// Start an upload session in `registry` and replay `path` into it.
pub fn replay_file(registry: &SessionRegistry, path: &Path) -> McpResult<ReplayReport> {
    let file = std::fs::File::open(path)?;
    let session = registry.start_session(SourceKind::Upload)?;
    tracing::info!("Replaying {} into session {}", path.display(), session.id());
    replay_reader(&session, std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_counter::EngineConfig;

    #[test]
    fn test_replay_counts_and_rejections() {
        let input = concat!(
            r#"{"track_id":"1","timestamp_ms":10000,"age_band":"18-34","gender":"female"}"#,
            "\n",
            r#"{"track_id":"2","timestamp_ms":10200,"age_band":"35-54","gender":"male"}"#,
            "\n\n",
            "not json\n",
            r#"{"track_id":"1","timestamp_ms":9000,"age_band":"18-34"}"#,
            "\n",
            r#"{"track_id":"3","timestamp_ms":10300,"age_band":"ninety"}"#,
            "\n",
        );
        let session = OccupancySession::new(SourceKind::Upload, &EngineConfig::default(), None).unwrap();

        let report = replay_reader(&session, input.as_bytes()).unwrap();

        assert_eq!(report.lines, 5);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.new_tracks, 2);
        assert_eq!(report.rejected.get("corrupt_event"), Some(&2));
        assert_eq!(report.rejected.get("stale_event"), Some(&1));
        assert_eq!(report.rejected_total(), 3);
        assert_eq!(report.summary.totals.total_count, 2);
        assert!(session.is_closed());
    }
}
