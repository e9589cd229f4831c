//! Counting session lifecycle: one ingest pipeline per video source.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::aggregator::BucketAggregator;
use crate::config::EngineConfig;
use crate::dedup::TrackDeduplicator;
use crate::ingest::{IngestGateway, IngestStats};
use crate::publisher::LivePublisher;
use crate::query::QueryService;
use crate::storage::BucketLogWriter;
use crate::timeline::TimelineStore;
use crate::types::{
    Bucket, CounterResult, DetectionEvent, IngestError, RawDetection, SceneState, SessionId,
    SessionTotals, SourceKind,
};

/// What one accepted detection did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub is_new_track: bool,
    /// Tracks that ended on this event's sweep.
    pub ended_tracks: usize,
    /// Buckets sealed by this event, gap fill included.
    pub sealed_buckets: usize,
    /// Index of the open bucket after the event.
    pub bucket_index: u64,
}

/// Final figures of an ended session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub totals: SessionTotals,
    pub buckets_sealed: u64,
    pub stats: IngestStats,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Descriptive view of a session, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub source: SourceKind,
    pub live: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_count: u64,
    pub current_count: u64,
    pub buckets_retained: usize,
}

/// Mutable ingest state, serialized behind one mutex.
struct Pipeline {
    gateway: IngestGateway,
    dedup: TrackDeduplicator,
    aggregator: BucketAggregator,
    log: Option<BucketLogWriter>,
    closed: bool,
    buckets_sealed: u64,
    log_failures: u64,
}

/// One counting session.
///
/// Ingest goes through `&self` and is serialized internally, so a session is
/// shared as `Arc<OccupancySession>` between the writer and any readers.
pub struct OccupancySession {
    id: SessionId,
    source: SourceKind,
    started_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    pipeline: Mutex<Pipeline>,
    timeline: TimelineStore,
    publisher: LivePublisher,
    totals: RwLock<SessionTotals>,
}

impl OccupancySession {
    pub fn new(
        source: SourceKind,
        config: &EngineConfig,
        log: Option<BucketLogWriter>,
    ) -> CounterResult<Self> {
        Self::with_id(SessionId::new(), source, config, log)
    }

    /// Fails with `InvalidConfig` before any state is built.

    pub fn with_id(
        id: SessionId,
        source: SourceKind,
        config: &EngineConfig,
        log: Option<BucketLogWriter>,
    ) -> CounterResult<Self> {
        config.validate()?;
        Ok(Self {
            id,
            source,
            started_at: Utc::now(),
            ended_at: Mutex::new(None),
            pipeline: Mutex::new(Pipeline {
                gateway: IngestGateway::new(
                    config.max_clock_skew(),
                    config.max_forward_jump(),
                    config.window() + config.inactivity_timeout(),
                ),
                dedup: TrackDeduplicator::new(config.inactivity_timeout()),
                aggregator: BucketAggregator::new(config.window()),
                log,
                closed: false,
                buckets_sealed: 0,
                log_failures: 0,
            }),
            timeline: TimelineStore::new(config.window(), config.max_history_buckets),
            publisher: LivePublisher::new(SceneState::empty(id)),
            totals: RwLock::new(SessionTotals::default()),
        })
    }

    fn pipeline(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Run one detection through gateway, deduplicator and aggregator.
    pub fn ingest(&self, event: &DetectionEvent) -> Result<IngestReceipt, IngestError> {
        let mut guard = self.pipeline();
        let p = &mut *guard;

        if p.closed {
            let err = IngestError::SessionClosed(self.id);
            p.gateway.record_rejection(&err);
            return Err(err);
        }
        if let Err(err) = p
            .gateway
            .check(event)
            .and_then(|_| p.aggregator.check_writable(event.timestamp_ms))
        {
            p.gateway.record_rejection(&err);
            return Err(err);
        }

        p.gateway.admit(event.timestamp_ms);
        let now = p.gateway.watermark().unwrap_or(event.timestamp_ms);
        let outcome = p.dedup.observe(event, now);
        let sealed = p.aggregator.apply(event.timestamp_ms, &outcome);
        if let Some(origin) = p.aggregator.origin_ms() {
            self.timeline.set_origin(origin);
        }

        let sealed_count = sealed.len();
        for bucket in sealed {
            self.seal(p, bucket);
        }
        if let Some(open) = p.aggregator.open_bucket() {
            self.publisher
                .publish(SceneState::from_bucket(self.id, open, false));
        }
        if outcome.is_new {
            *self.totals.write().unwrap_or_else(PoisonError::into_inner) =
                p.aggregator.totals().clone();
        }

        Ok(IngestReceipt {
            is_new_track: outcome.is_new,
            ended_tracks: outcome.ended.len(),
            sealed_buckets: sealed_count,
            bucket_index: p.aggregator.open_bucket().map_or(0, |b| b.index),
        })
    }

    /// Parse a wire detection and ingest it. Parse failures count as corrupt.
    pub fn ingest_raw(&self, raw: RawDetection) -> Result<IngestReceipt, IngestError> {
        match raw.parse() {
            Ok(event) => self.ingest(&event),
            Err(err) => {
                self.pipeline().gateway.record_rejection(&err);
                Err(err)
            }
        }
    }

    /// Seal the open bucket, release every track and stop accepting events.
    ///
    /// Calling it again returns the same summary.
    pub fn end(&self) -> SessionSummary {
        let mut guard = self.pipeline();
        let p = &mut *guard;

        if !p.closed {
            p.closed = true;
            let released = p.dedup.drain();
            if let Some(bucket) = p.aggregator.close() {
                let final_state = SceneState::from_bucket(self.id, &bucket, true);
                self.seal(p, bucket);
                self.publisher.finish(final_state);
            } else {
                self.publisher.finish(SceneState {
                    sealed: true,
                    ..SceneState::empty(self.id)
                });
            }
            if let Some(log) = p.log.as_mut() {
                if let Err(e) = log.flush() {
                    p.log_failures += 1;
                    tracing::error!("Failed to flush bucket log for session {}: {e}", self.id);
                }
            }
            *self.totals.write().unwrap_or_else(PoisonError::into_inner) =
                p.aggregator.totals().clone();

            let mut ended_at = self.ended_at.lock().unwrap_or_else(PoisonError::into_inner);
            ended_at.get_or_insert_with(Utc::now);
            tracing::info!(
                "Ended session {} ({} tracks released, {} counted)",
                self.id,
                released.len(),
                p.aggregator.totals().total_count
            );
        }

        SessionSummary {
            session_id: self.id,
            totals: p.aggregator.totals().clone(),
            buckets_sealed: p.buckets_sealed,
            stats: p.gateway.stats(),
            started_at: self.started_at,
            ended_at: self.ended_at().unwrap_or(self.started_at),
        }
    }

    fn seal(&self, p: &mut Pipeline, bucket: Bucket) {
        if let Some(log) = p.log.as_mut() {
            if let Err(e) = log.append(&bucket) {
                p.log_failures += 1;
                tracing::error!(
                    "Failed to persist bucket {} of session {}: {e}",
                    bucket.index,
                    self.id
                );
            }
        }
        let bucket = self.timeline.append(bucket);
        p.buckets_sealed += 1;
        self.publisher
            .publish(SceneState::from_bucket(self.id, &bucket, true));
    }

    pub fn current_scene(&self) -> SceneState {
        self.publisher.snapshot()
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> IngestStats {
        self.pipeline().gateway.stats()
    }

    /// Bucket-log writes that failed. Ingestion continues regardless.
    pub fn log_failures(&self) -> u64 {
        self.pipeline().log_failures
    }

    pub fn subscribe(&self) -> watch::Receiver<SceneState> {
        self.publisher.subscribe()
    }

    pub fn query(&self) -> QueryService<'_> {
        QueryService::new(self.id, &self.timeline, &self.publisher)
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.timeline
    }

    pub fn is_closed(&self) -> bool {
        !self.publisher.is_live()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        *self.ended_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> SessionInfo {
        let scene = self.current_scene();
        SessionInfo {
            session_id: self.id,
            source: self.source,
            live: !self.is_closed(),
            started_at: self.started_at,
            ended_at: self.ended_at(),
            total_count: self.totals().total_count,
            current_count: scene.current_count,
            buckets_retained: self.timeline.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::types::{AgeBand, CounterError, Gender, QueryError};

    fn session() -> OccupancySession {
        OccupancySession::new(SourceKind::Upload, &EngineConfig::default(), None).unwrap()
    }

    fn det(id: &str, ts: i64, age: AgeBand, gender: Gender) -> DetectionEvent {
        DetectionEvent::new(id, ts, age, gender)
    }

    #[test]
    fn test_first_window_scenario() {
        let s = session();
        s.ingest(&det("1", 0, AgeBand::From18To34, Gender::Male)).unwrap();
        s.ingest(&det("1", 300, AgeBand::From18To34, Gender::Male)).unwrap();
        s.ingest(&det("2", 500, AgeBand::Under18, Gender::Female)).unwrap();
        s.ingest(&det("1", 600, AgeBand::From18To34, Gender::Male)).unwrap();

        let live = s.current_scene();
        assert_eq!(live.total_delta, 2);
        assert_eq!(live.current_count, 2);
        assert_eq!(s.totals().total_count, 2);

        let summary = s.end();
        assert_eq!(summary.buckets_sealed, 1);
        let b0 = s.timeline().get(0).unwrap();
        assert_eq!(b0.total_delta, 2);
        assert_eq!(b0.age_histogram.get(AgeBand::From18To34), 1);
        assert_eq!(b0.age_histogram.get(AgeBand::Under18), 1);
        assert_eq!(b0.gender_histogram.get(Gender::Male), 1);
        assert_eq!(b0.gender_histogram.get(Gender::Female), 1);
    }

    #[test]
    fn test_stale_event_leaves_totals() {
        let s = session();
        s.ingest(&det("1", 10_000, AgeBand::Over55, Gender::Male)).unwrap();
        let before = s.totals();

        let err = s
            .ingest(&det("2", 9_400, AgeBand::Under18, Gender::Female))
            .unwrap_err();
        assert_eq!(err.kind(), "stale_event");
        assert_eq!(s.totals(), before);
        assert_eq!(s.stats().stale, 1);
    }

    #[test]
    fn test_zero_event_session_ends_cleanly() {
        let s = session();
        let summary = s.end();
        assert_eq!(summary.totals.total_count, 0);
        assert_eq!(summary.buckets_sealed, 0);

        let scene = s.current_scene();
        assert_eq!(scene.current_count, 0);
        assert!(scene.demographics.age.iter().all(|a| a.percent == 0));
        assert!(s.timeline().is_empty());
        assert!(matches!(
            s.query().state_at(0),
            Err(QueryError::NotYetRecorded { .. })
        ));
    }

    #[test]
    fn test_closed_session_rejects() {
        let s = session();
        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Male)).unwrap();
        let first = s.end();
        let err = s
            .ingest(&det("1", 100, AgeBand::Under18, Gender::Male))
            .unwrap_err();
        assert_eq!(err, IngestError::SessionClosed(s.id()));
        assert_eq!(s.stats().closed, 1);
        assert!(s.is_closed());

        let second = s.end();
        assert_eq!(first.totals, second.totals);
        assert_eq!(first.ended_at, second.ended_at);
    }

    #[test]
    fn test_late_event_rejected() {
        let s = session();
        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Male)).unwrap();
        s.ingest(&det("1", 1_100, AgeBand::Under18, Gender::Male)).unwrap();
        // Within skew but inside sealed bucket 0.
        let err = s
            .ingest(&det("2", 900, AgeBand::Under18, Gender::Male))
            .unwrap_err();
        assert_eq!(err.kind(), "late_event");
        assert_eq!(s.timeline().get(0).unwrap().total_delta, 1);
    }

    #[test]
    fn test_ingest_raw_counts_corrupt() {
        let s = session();
        let raw = RawDetection {
            track_id: "x".into(),
            timestamp_ms: 0,
            age_band: "ancient".into(),
            gender: None,
            bounding_box: None,
            confidence: None,
        };
        assert!(s.ingest_raw(raw).is_err());
        assert_eq!(s.stats().corrupt, 1);
    }

    #[test]
    fn test_current_count_never_negative_through_gaps() {
        let s = session();
        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Male)).unwrap();
        s.ingest(&det("2", 100, AgeBand::Under18, Gender::Female)).unwrap();
        let receipt = s
            .ingest(&det("3", 10_000, AgeBand::Over55, Gender::Male))
            .unwrap();
        assert_eq!(receipt.ended_tracks, 2);
        assert_eq!(receipt.sealed_buckets, 10);
        assert_eq!(receipt.bucket_index, 10);

        let counts = s.query().timeline_counts();
        assert_eq!(counts, vec![2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(s.totals().total_count, 3);
    }

    #[test]
    fn test_log_receives_sealed_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.occl");
        let id = SessionId::new();
        let log = BucketLogWriter::create(&path, id, 1_000).unwrap();
        let s = OccupancySession::with_id(id, SourceKind::Webcam, &EngineConfig::default(), Some(log))
            .unwrap();

        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Male)).unwrap();
        s.ingest(&det("1", 2_500, AgeBand::Under18, Gender::Male)).unwrap();
        s.end();

        let log = crate::storage::BucketLogReader::read_from_file(&path).unwrap();
        assert_eq!(log.records.len(), 3);
        log.verify().unwrap();
        assert_eq!(s.log_failures(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let config = EngineConfig {
            window_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            OccupancySession::new(SourceKind::Webcam, &config, None),
            Err(CounterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_timestamp_near_end_of_time_is_corrupt() {
        let s = session();
        let err = s
            .ingest(&det("1", i64::MAX - 10, AgeBand::Under18, Gender::Male))
            .unwrap_err();
        assert_eq!(err.kind(), "corrupt_event");
        assert!(s.current_scene().window.is_none());

        // The pipeline is untouched and keeps working.
        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Male)).unwrap();
        assert_eq!(s.totals().total_count, 1);
        assert_eq!(s.stats().corrupt, 1);
    }

    #[test]
    fn test_older_frame_does_not_undo_refined_label() {
        let s = session();
        s.ingest(&det("1", 0, AgeBand::Under18, Gender::Unknown)).unwrap();
        s.ingest(&det("1", 400, AgeBand::From35To54, Gender::Female)).unwrap();
        // Arrives late but within skew, carrying the coarser first guess.
        s.ingest(&det("1", 300, AgeBand::Under18, Gender::Unknown)).unwrap();

        let scene = s.current_scene();
        assert_eq!(scene.demographics.age_percent(AgeBand::From35To54), 100);
        assert_eq!(scene.demographics.age_percent(AgeBand::Under18), 0);
        assert_eq!(scene.demographics.gender_percent(Gender::Female), 100);
    }

    #[test]
    fn test_readers_see_consistent_history_while_ingesting() {
        const SPAN_MS: i64 = 600_000;
        let s = session();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4i64)
                .map(|r| {
                    let s = &s;
                    let done = &done;
                    scope.spawn(move || {
                        let mut sealed: HashMap<u64, SceneState> = HashMap::new();
                        let mut last_total = 0;
                        let mut round = 0i64;
                        while !done.load(Ordering::Acquire) {
                            round += 1;
                            let totals = s.totals();
                            assert!(totals.total_count >= last_total);
                            last_total = totals.total_count;

                            let live = s.current_scene();
                            assert!(live.current_count <= 5);

                            let t = (round * 7_919 + r * 331) % SPAN_MS;
                            let mut observed = Vec::new();
                            if let Ok(state) = s.query().state_at(t) {
                                observed.push(state);
                            }
                            if let Ok(states) = s.query().state_in_range(0, i64::MAX) {
                                observed.extend(states);
                            }
                            for state in observed.into_iter().filter(|st| st.sealed) {
                                assert!(state.current_count <= 5);
                                assert!(state.current_count <= state.total_count);
                                let Some(window) = state.window else {
                                    continue;
                                };
                                match sealed.get(&window.index) {
                                    Some(seen) => assert_eq!(seen, &state),
                                    None => {
                                        sealed.insert(window.index, state);
                                    }
                                }
                            }
                        }
                    })
                })
                .collect();

            // Five people drifting in and out of view.
            for t in (0..SPAN_MS).step_by(250) {
                let person = (t / 1_750) % 5;
                if (t / 10_000 + person) % 3 == 0 {
                    continue;
                }
                let event = det(&person.to_string(), t, AgeBand::From18To34, Gender::Female);
                let _ = s.ingest(&event);
            }
            s.end();
            done.store(true, Ordering::Release);

            for reader in readers {
                reader.join().unwrap();
            }
        });

        assert_eq!(s.stats().rejected(), 0);
        assert!(s.totals().total_count > 5);
        let last = s.timeline().latest_sealed().unwrap();
        assert_eq!(s.current_scene().current_count, last.current_count);
    }
}
