//! Folds track updates into fixed-width time buckets.

use crate::dedup::{DedupOutcome, EndedTrack};
use crate::demographics::{AgeHistogram, GenderHistogram};
use crate::types::{Bucket, IngestError, SessionTotals};

/// Owns the open bucket and the running counts behind it.
///
/// Windows are derived from stream time only. The first window is aligned
/// to a multiple of `window_ms` at or below the first timestamp.
#[derive(Debug)]
pub struct BucketAggregator {
    window_ms: i64,
    origin_ms: Option<i64>,
    open: Option<Bucket>,
    next_index: u64,
    current_count: u64,
    active_age: AgeHistogram,
    active_gender: GenderHistogram,
    totals: SessionTotals,
}

impl BucketAggregator {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            origin_ms: None,
            open: None,
            next_index: 0,
            current_count: 0,
            active_age: AgeHistogram::default(),
            active_gender: GenderHistogram::default(),
            totals: SessionTotals::default(),
        }
    }

    /// Refuse timestamps that fall inside already sealed windows.
    pub fn check_writable(&self, timestamp_ms: i64) -> Result<(), IngestError> {
        match &self.open {
            Some(open) if timestamp_ms < open.start_ms => Err(IngestError::LateEvent {
                timestamp_ms,
                sealed_until_ms: open.start_ms,
            }),
            None if self.next_index > 0 => Err(IngestError::LateEvent {
                timestamp_ms,
                sealed_until_ms: self.sealed_until_ms().unwrap_or(timestamp_ms),
            }),
            _ => Ok(()),
        }
    }

    /// Apply one deduplicated update at `timestamp_ms`.
    ///
    /// Returns the buckets sealed on the way, oldest first. Windows with no
    /// detections are sealed empty so the timeline never has holes.
    pub fn apply(&mut self, timestamp_ms: i64, outcome: &DedupOutcome) -> Vec<Bucket> {
        let mut sealed = Vec::new();

        if self.open.is_none() && self.next_index == 0 {
            let origin = timestamp_ms - timestamp_ms.rem_euclid(self.window_ms);
            self.origin_ms = Some(origin);
            self.open = Some(Bucket::empty(0, origin, self.window_ms));
            self.next_index = 1;
            tracing::debug!("Opened first bucket at {origin}ms");
        }

        let mut ends = outcome.ended.iter().peekable();
        loop {
            let Some(open_end) = self.open.as_ref().map(|b| b.end_ms) else {
                break;
            };
            while let Some(ended) = ends.next_if(|e| e.expired_at_ms < open_end) {
                self.end_track(ended);
            }
            if timestamp_ms < open_end {
                break;
            }
            if let Some(bucket) = self.seal_and_advance() {
                sealed.push(bucket);
            }
        }
        for ended in ends {
            self.end_track(ended);
        }

        if outcome.is_new {
            let track = &outcome.track;
            self.current_count += 1;
            self.active_age.increment(track.age_band);
            self.active_gender.increment(track.gender);
            self.totals.record_new(track.age_band, track.gender);
            if let Some(open) = self.open.as_mut() {
                open.total_delta += 1;
                open.age_histogram.increment(track.age_band);
                open.gender_histogram.increment(track.gender);
            }
        } else if let Some((age, gender)) = outcome.relabeled_from {
            self.active_age.decrement(age);
            self.active_gender.decrement(gender);
            self.active_age.increment(outcome.track.age_band);
            self.active_gender.increment(outcome.track.gender);
        }

        self.sync_open();
        sealed
    }

    /// Seal the open bucket now, regardless of its window.
    pub fn close(&mut self) -> Option<Bucket> {
        self.sync_open();
        let bucket = self.open.take();
        if let Some(b) = &bucket {
            tracing::debug!(
                "Closed bucket {} [{}, {}) early with {} present",
                b.index,
                b.start_ms,
                b.end_ms,
                b.current_count
            );
        }
        bucket
    }

    pub fn open_bucket(&self) -> Option<&Bucket> {
        self.open.as_ref()
    }

    pub fn totals(&self) -> &SessionTotals {
        &self.totals
    }

    pub fn origin_ms(&self) -> Option<i64> {
        self.origin_ms
    }

    pub fn current_count(&self) -> u64 {
        self.current_count
    }

    /// End of the sealed history, i.e. start of the open window.
    fn sealed_until_ms(&self) -> Option<i64> {
        let origin = self.origin_ms?;
        let sealed = self.next_index.saturating_sub(u64::from(self.open.is_some()));
        Some(origin + sealed as i64 * self.window_ms)
    }

    fn end_track(&mut self, ended: &EndedTrack) {
        self.current_count = self.current_count.saturating_sub(1);
        self.active_age.decrement(ended.track.age_band);
        self.active_gender.decrement(ended.track.gender);
    }

    fn sync_open(&mut self) {
        if let Some(open) = self.open.as_mut() {
            open.current_count = self.current_count;
            open.running_total = self.totals.total_count;
            open.active_age = self.active_age.clone();
            open.active_gender = self.active_gender.clone();
        }
    }

    fn seal_and_advance(&mut self) -> Option<Bucket> {
        self.sync_open();
        let sealed = self.open.take()?;

        let mut next = Bucket::empty(self.next_index, sealed.end_ms, self.window_ms);
        next.current_count = self.current_count;
        next.running_total = self.totals.total_count;
        next.active_age = self.active_age.clone();
        next.active_gender = self.active_gender.clone();
        self.open = Some(next);
        self.next_index += 1;

        Some(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::TrackDeduplicator;
    use crate::types::{AgeBand, DetectionEvent, Gender};

    struct Harness {
        dedup: TrackDeduplicator,
        agg: BucketAggregator,
        sealed: Vec<Bucket>,
    }

    impl Harness {
        fn new(window_ms: i64, timeout_ms: i64) -> Self {
            Self {
                dedup: TrackDeduplicator::new(timeout_ms),
                agg: BucketAggregator::new(window_ms),
                sealed: Vec::new(),
            }
        }

        fn feed(&mut self, id: &str, ts: i64, age: AgeBand, gender: Gender) {
            let event = DetectionEvent::new(id, ts, age, gender);
            let outcome = self.dedup.observe(&event, ts);
            self.sealed.extend(self.agg.apply(ts, &outcome));
        }
    }

    #[test]
    fn test_first_window_scenario() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 0, AgeBand::From18To34, Gender::Male);
        h.feed("1", 300, AgeBand::From18To34, Gender::Male);
        h.feed("2", 500, AgeBand::Under18, Gender::Female);
        h.feed("1", 600, AgeBand::From18To34, Gender::Male);
        let b0 = h.agg.close().unwrap();

        assert_eq!(b0.index, 0);
        assert_eq!((b0.start_ms, b0.end_ms), (0, 1_000));
        assert_eq!(b0.total_delta, 2);
        assert_eq!(b0.age_histogram.get(AgeBand::From18To34), 1);
        assert_eq!(b0.age_histogram.get(AgeBand::Under18), 1);
        assert_eq!(b0.gender_histogram.get(Gender::Male), 1);
        assert_eq!(b0.gender_histogram.get(Gender::Female), 1);
        assert_eq!(h.agg.totals().total_count, 2);
    }

    #[test]
    fn test_gap_fills_empty_buckets() {
        let mut h = Harness::new(1_000, 10_000);
        h.feed("1", 200, AgeBand::Over55, Gender::Male);
        h.feed("1", 3_500, AgeBand::Over55, Gender::Male);

        assert_eq!(h.sealed.len(), 3);
        for (i, bucket) in h.sealed.iter().enumerate() {
            assert_eq!(bucket.index, i as u64);
            assert_eq!(bucket.start_ms, i as i64 * 1_000);
            assert_eq!(bucket.current_count, 1);
        }
        assert_eq!(h.sealed[1].total_delta, 0);
        assert_eq!(h.sealed[2].total_delta, 0);
        assert_eq!(h.agg.open_bucket().unwrap().index, 3);
    }

    #[test]
    fn test_end_lands_in_expiry_window() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 100, AgeBand::Under18, Gender::Male);
        h.feed("2", 5_500, AgeBand::Under18, Gender::Female);

        // Track 1 expires at 2_100, inside bucket 2.
        let counts: Vec<u64> = h.sealed.iter().map(|b| b.current_count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 0]);
        assert!(h.sealed[2].active_age.is_empty());
        assert_eq!(h.agg.current_count(), 1);
    }

    #[test]
    fn test_origin_aligned_to_window() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 12_345, AgeBand::Under18, Gender::Male);
        assert_eq!(h.agg.origin_ms(), Some(12_000));
        assert_eq!(h.agg.open_bucket().unwrap().start_ms, 12_000);
    }

    #[test]
    fn test_relabel_moves_active_counts() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 0, AgeBand::Under18, Gender::Unknown);
        h.feed("1", 100, AgeBand::From18To34, Gender::Female);

        let open = h.agg.open_bucket().unwrap();
        assert_eq!(open.active_age.get(AgeBand::From18To34), 1);
        assert_eq!(open.active_age.get(AgeBand::Under18), 0);
        assert_eq!(open.active_gender.get(Gender::Female), 1);
        // First-sight labels stay on the bucket's new-track histogram.
        assert_eq!(open.age_histogram.get(AgeBand::Under18), 1);
    }

    #[test]
    fn test_late_event_refused_after_seal() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 0, AgeBand::Under18, Gender::Male);
        h.feed("1", 1_200, AgeBand::Under18, Gender::Male);

        assert!(h.agg.check_writable(1_100).is_ok());
        assert_eq!(
            h.agg.check_writable(900),
            Err(IngestError::LateEvent {
                timestamp_ms: 900,
                sealed_until_ms: 1_000,
            })
        );
    }

    #[test]
    fn test_closed_aggregator_refuses_everything() {
        let mut h = Harness::new(1_000, 2_000);
        h.feed("1", 0, AgeBand::Under18, Gender::Male);
        h.agg.close().unwrap();
        assert!(matches!(
            h.agg.check_writable(5_000),
            Err(IngestError::LateEvent { .. })
        ));
    }

    #[test]
    fn test_running_total_carried_forward() {
        let mut h = Harness::new(1_000, 60_000);
        h.feed("1", 0, AgeBand::Under18, Gender::Male);
        h.feed("2", 1_000, AgeBand::Under18, Gender::Male);
        h.feed("3", 2_000, AgeBand::Under18, Gender::Male);

        let totals: Vec<u64> = h.sealed.iter().map(|b| b.running_total).collect();
        assert_eq!(totals, vec![1, 2]);
        assert_eq!(h.agg.open_bucket().unwrap().running_total, 3);
    }
}
