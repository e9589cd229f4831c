//! Point and range queries over a session's timeline.

use crate::publisher::LivePublisher;
use crate::timeline::TimelineStore;
use crate::types::{QueryError, SceneState, SessionId};

/// Read-only view answering `state_at` / `state_in_range` for one session.
///
/// Sealed buckets come from the timeline; the still-open bucket comes from
/// the live snapshot. Neither path takes the ingest lock.
pub struct QueryService<'a> {
    session_id: SessionId,
    timeline: &'a TimelineStore,
    live: &'a LivePublisher,
}

impl<'a> QueryService<'a> {
    pub fn new(session_id: SessionId, timeline: &'a TimelineStore, live: &'a LivePublisher) -> Self {
        Self {
            session_id,
            timeline,
            live,
        }
    }

    /// Scene state of the bucket whose window contains `timestamp_ms`.
    pub fn state_at(&self, timestamp_ms: i64) -> Result<SceneState, QueryError> {
        if timestamp_ms < 0 {
            return Err(QueryError::OutOfRange { timestamp_ms });
        }

        // Snapshot first: a bucket sealed after this read is found in the timeline.
        let snapshot = self.live.snapshot();
        let Some(origin) = self.origin(&snapshot) else {
            return Err(QueryError::NotYetRecorded {
                timestamp_ms,
                latest_ms: None,
            });
        };
        if timestamp_ms < origin {
            return Err(QueryError::OutOfRange { timestamp_ms });
        }
        if let Some(summary) = self.timeline.compacted() {
            if timestamp_ms < summary.end_ms {
                return Err(QueryError::Compacted {
                    timestamp_ms,
                    compacted_until_ms: summary.end_ms,
                });
            }
        }

        if let Some(bucket) = self.timeline.locate(timestamp_ms) {
            return Ok(SceneState::from_bucket(self.session_id, &bucket, true));
        }
        if snapshot.open_at(timestamp_ms) {
            return Ok(snapshot);
        }

        Err(QueryError::NotYetRecorded {
            timestamp_ms,
            latest_ms: self.latest_end(&snapshot),
        })
    }

    /// Scene states of every retained bucket overlapping `[from_ms, to_ms)`,
    /// oldest first, with the open bucket last when it overlaps.
    ///
    /// A range starting before the session origin is clipped to it. Compacted
    /// history is skipped.
    pub fn state_in_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<SceneState>, QueryError> {
        if from_ms > to_ms {
            return Err(QueryError::InvalidRange { from_ms, to_ms });
        }
        if from_ms < 0 {
            return Err(QueryError::OutOfRange {
                timestamp_ms: from_ms,
            });
        }

        let snapshot = self.live.snapshot();
        let Some(origin) = self.origin(&snapshot) else {
            return Err(QueryError::NotYetRecorded {
                timestamp_ms: from_ms,
                latest_ms: None,
            });
        };
        if to_ms <= origin && from_ms < origin {
            return Err(QueryError::OutOfRange {
                timestamp_ms: from_ms,
            });
        }
        let latest = self.latest_end(&snapshot);
        if latest.is_some_and(|end| from_ms >= end) {
            return Err(QueryError::NotYetRecorded {
                timestamp_ms: from_ms,
                latest_ms: latest,
            });
        }

        let from_ms = from_ms.max(origin);
        let to_ms = latest.map_or(to_ms, |end| to_ms.min(end));
        let mut states: Vec<SceneState> = Vec::new();
        let mut last_index = None;
        for bucket in self.timeline.range(from_ms, to_ms) {
            last_index = Some(bucket.index);
            states.push(SceneState::from_bucket(self.session_id, &bucket, true));
        }

        if let Some(window) = snapshot.window.filter(|_| !snapshot.sealed) {
            let overlaps = window.start_ms < to_ms && window.end_ms > from_ms;
            let already = last_index.is_some_and(|i| i >= window.index);
            if overlaps && !already {
                states.push(snapshot);
            }
        }

        Ok(states)
    }

    /// Map a slider position in `0..=steps` onto the retained span and
    /// return the state at that point.
    pub fn scrub(&self, position: u64, steps: u64) -> Result<SceneState, QueryError> {
        if steps == 0 {
            return Err(QueryError::InvalidRange {
                from_ms: position as i64,
                to_ms: 0,
            });
        }
        let Some((start, end)) = self.recorded_span() else {
            return Err(QueryError::NotYetRecorded {
                timestamp_ms: 0,
                latest_ms: None,
            });
        };

        let position = position.min(steps);
        let last_ms = (end - 1).max(start);
        let offset = (i128::from(last_ms - start) * i128::from(position)) / i128::from(steps);
        self.state_at(start + offset as i64)
    }

    /// `[start, end)` of the history that can still be queried.
    pub fn recorded_span(&self) -> Option<(i64, i64)> {
        let snapshot = self.live.snapshot();
        let start = self
            .timeline
            .retained_from_ms()
            .or_else(|| snapshot.window.filter(|_| !snapshot.sealed).map(|w| w.start_ms))?;
        let end = self.latest_end(&snapshot)?;
        Some((start, end))
    }

    /// Present-count series over retained history, open bucket included.
    pub fn timeline_counts(&self) -> Vec<u64> {
        let snapshot = self.live.snapshot();
        let mut counts: Vec<u64> = self
            .timeline
            .range(i64::MIN / 2, i64::MAX / 2)
            .map(|b| b.current_count)
            .collect();
        if !snapshot.sealed && snapshot.window.is_some() {
            let open_index = snapshot.window.map(|w| w.index);
            let latest = self.timeline.latest_sealed().map(|b| b.index);
            if latest.is_none() || open_index > latest {
                counts.push(snapshot.current_count);
            }
        }
        counts
    }

    fn origin(&self, snapshot: &SceneState) -> Option<i64> {
        self.timeline
            .origin_ms()
            .or_else(|| snapshot.window.map(|w| w.start_ms))
    }

    fn latest_end(&self, snapshot: &SceneState) -> Option<i64> {
        let sealed = self.timeline.sealed_until_ms();
        let open = snapshot.window.map(|w| w.end_ms);
        sealed.max(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bucket;

    struct Fixture {
        id: SessionId,
        timeline: TimelineStore,
        live: LivePublisher,
    }

    impl Fixture {
        fn new(max_buckets: usize) -> Self {
            let id = SessionId::new();
            Self {
                id,
                timeline: TimelineStore::new(1_000, max_buckets),
                live: LivePublisher::new(SceneState::empty(id)),
            }
        }

        /// Seal `n` buckets starting at `origin`, then open the next one.
        fn record(&self, origin: i64, n: u64) {
            self.timeline.set_origin(origin);
            for i in 0..n {
                let mut b = Bucket::empty(i, origin + i as i64 * 1_000, 1_000);
                b.current_count = i + 1;
                b.running_total = i + 1;
                b.total_delta = 1;
                self.timeline.append(b);
            }
            let mut open = Bucket::empty(n, origin + n as i64 * 1_000, 1_000);
            open.current_count = 99;
            self.live.publish(SceneState::from_bucket(self.id, &open, false));
        }

        fn query(&self) -> QueryService<'_> {
            QueryService::new(self.id, &self.timeline, &self.live)
        }
    }

    #[test]
    fn test_state_at_sealed_is_idempotent() {
        let f = Fixture::new(100);
        f.record(0, 5);
        let a = f.query().state_at(2_500).unwrap();
        let b = f.query().state_at(2_500).unwrap();
        assert_eq!(a, b);
        assert!(a.sealed);
        assert_eq!(a.current_count, 3);
    }

    #[test]
    fn test_state_at_open_bucket() {
        let f = Fixture::new(100);
        f.record(0, 3);
        let state = f.query().state_at(3_200).unwrap();
        assert!(!state.sealed);
        assert_eq!(state.current_count, 99);
    }

    #[test]
    fn test_beyond_latest_not_yet_recorded() {
        let f = Fixture::new(100);
        f.record(0, 40);
        let err = f.query().state_at(50_000).unwrap_err();
        assert_eq!(
            err,
            QueryError::NotYetRecorded {
                timestamp_ms: 50_000,
                latest_ms: Some(41_000),
            }
        );
    }

    #[test]
    fn test_out_of_range() {
        let f = Fixture::new(100);
        f.record(10_000, 3);
        assert_eq!(
            f.query().state_at(-1),
            Err(QueryError::OutOfRange { timestamp_ms: -1 })
        );
        assert_eq!(
            f.query().state_at(9_999),
            Err(QueryError::OutOfRange { timestamp_ms: 9_999 })
        );
    }

    #[test]
    fn test_nothing_recorded() {
        let f = Fixture::new(100);
        assert!(matches!(
            f.query().state_at(0),
            Err(QueryError::NotYetRecorded { latest_ms: None, .. })
        ));
        assert!(f.query().timeline_counts().is_empty());
    }

    #[test]
    fn test_compacted_history() {
        let f = Fixture::new(3);
        f.record(0, 6);
        assert_eq!(
            f.query().state_at(1_500),
            Err(QueryError::Compacted {
                timestamp_ms: 1_500,
                compacted_until_ms: 3_000,
            })
        );
        assert!(f.query().state_at(3_000).is_ok());
    }

    #[test]
    fn test_range_includes_open_last() {
        let f = Fixture::new(100);
        f.record(0, 4);
        let states = f.query().state_in_range(2_000, 10_000).unwrap();
        let counts: Vec<u64> = states.iter().map(|s| s.current_count).collect();
        assert_eq!(counts, vec![3, 4, 99]);
        assert!(!states.last().unwrap().sealed);
    }

    #[test]
    fn test_range_errors() {
        let f = Fixture::new(100);
        f.record(5_000, 4);
        let q = f.query();
        assert!(matches!(
            q.state_in_range(3_000, 1_000),
            Err(QueryError::InvalidRange { .. })
        ));
        assert!(matches!(
            q.state_in_range(10_000, 12_000),
            Err(QueryError::NotYetRecorded { .. })
        ));
        assert!(matches!(
            q.state_in_range(0, 4_000),
            Err(QueryError::OutOfRange { .. })
        ));
        // Clipped to the origin.
        assert_eq!(q.state_in_range(0, 6_000).unwrap().len(), 1);
        assert!(q.state_in_range(6_000, 6_000).unwrap().is_empty());
    }

    #[test]
    fn test_range_to_end_of_time() {
        let f = Fixture::new(100);
        f.record(0, 2);
        let states = f.query().state_in_range(0, i64::MAX).unwrap();
        let counts: Vec<u64> = states.iter().map(|s| s.current_count).collect();
        assert_eq!(counts, vec![1, 2, 99]);
    }

    #[test]
    fn test_scrub_endpoints() {
        let f = Fixture::new(100);
        f.record(0, 10);
        let q = f.query();
        assert_eq!(q.scrub(0, 100).unwrap().current_count, 1);
        assert_eq!(q.scrub(100, 100).unwrap().current_count, 99);
        assert_eq!(q.scrub(500, 100).unwrap().current_count, 99);
        assert_eq!(q.scrub(50, 100).unwrap().window.unwrap().index, 5);
        assert!(q.scrub(1, 0).is_err());
    }

    #[test]
    fn test_timeline_counts() {
        let f = Fixture::new(100);
        f.record(0, 3);
        assert_eq!(f.query().timeline_counts(), vec![1, 2, 3, 99]);
    }
}
