//! Ingest gateway: watermark and skew checks ahead of the deduplicator.

use serde::{Deserialize, Serialize};

use crate::types::{DetectionEvent, IngestError};

/// Accept and rejection counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub stale: u64,
    pub late: u64,
    pub corrupt: u64,
    pub closed: u64,
}

impl IngestStats {
    pub fn rejected(&self) -> u64 {
        self.stale + self.late + self.corrupt + self.closed
    }
}

/// Watermark and skew bookkeeping for one detection stream.
///
/// Events pass through in arrival order. Anything older than the watermark
/// by more than the skew tolerance is dropped; the bucket window absorbs
/// smaller disorder.
#[derive(Debug, Clone)]
pub struct IngestGateway {
    max_clock_skew_ms: i64,
    max_forward_jump_ms: i64,
    max_timestamp_ms: i64,
    watermark: Option<i64>,
    stats: IngestStats,
}

impl IngestGateway {
    /// `horizon_ms` is how far past an event the pipeline may look: a
    /// timestamp within it of `i64::MAX` is rejected as corrupt.
    pub fn new(max_clock_skew_ms: i64, max_forward_jump_ms: i64, horizon_ms: i64) -> Self {
        Self {
            max_clock_skew_ms,
            max_forward_jump_ms,
            max_timestamp_ms: i64::MAX.saturating_sub(horizon_ms.max(0)),
            watermark: None,
            stats: IngestStats::default(),
        }
    }

    /// Validate and admit an event in one step.
    pub fn submit(&mut self, event: &DetectionEvent) -> Result<(), IngestError> {
        if let Err(e) = self.check(event) {
            self.record_rejection(&e);
            return Err(e);
        }
        self.admit(event.timestamp_ms);
        Ok(())
    }

    /// Validate without touching the watermark or the counters.
    pub fn check(&self, event: &DetectionEvent) -> Result<(), IngestError> {
        if event.timestamp_ms < 0 {
            return Err(IngestError::CorruptEvent(format!(
                "negative timestamp {}ms for track '{}'",
                event.timestamp_ms, event.track_id
            )));
        }
        if event.timestamp_ms > self.max_timestamp_ms {
            return Err(IngestError::CorruptEvent(format!(
                "timestamp {}ms for track '{}' is beyond the representable timeline",
                event.timestamp_ms, event.track_id
            )));
        }
        if event.track_id.trim().is_empty() {
            return Err(IngestError::CorruptEvent("empty track id".to_string()));
        }

        if let Some(watermark) = self.watermark {
            if event.timestamp_ms < watermark - self.max_clock_skew_ms {
                return Err(IngestError::StaleEvent {
                    timestamp_ms: event.timestamp_ms,
                    watermark_ms: watermark,
                    max_skew_ms: self.max_clock_skew_ms,
                });
            }
            if event.timestamp_ms > watermark.saturating_add(self.max_forward_jump_ms) {
                return Err(IngestError::CorruptEvent(format!(
                    "timestamp {}ms jumps more than {}ms past watermark {watermark}ms",
                    event.timestamp_ms, self.max_forward_jump_ms
                )));
            }
        }

        Ok(())
    }

    /// Advance the watermark for an event that passed every check.
    pub fn admit(&mut self, timestamp_ms: i64) {
        self.watermark = Some(self.watermark.map_or(timestamp_ms, |w| w.max(timestamp_ms)));
        self.stats.accepted += 1;
    }

    pub fn record_rejection(&mut self, error: &IngestError) {
        match error {
            IngestError::StaleEvent { .. } => {
                tracing::debug!("Dropped stale event: {error}");
                self.stats.stale += 1;
            }
            IngestError::LateEvent { .. } => {
                tracing::debug!("Dropped late event: {error}");
                self.stats.late += 1;
            }
            IngestError::CorruptEvent(_) => {
                tracing::warn!("Dropped corrupt event: {error}");
                self.stats.corrupt += 1;
            }
            IngestError::SessionClosed(_) => {
                tracing::debug!("Dropped event for closed session: {error}");
                self.stats.closed += 1;
            }
        }
    }

    /// The latest accepted timestamp.
    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}
