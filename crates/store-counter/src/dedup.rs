//! Collapses per-frame detections into per-person presence tracks.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{AgeBand, DetectionEvent, Gender};

/// One person's presence, as identified by the external tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub age_band: AgeBand,
    pub gender: Gender,
}

/// A track evicted after going quiet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedTrack {
    pub track: Track,
    /// `last_seen_ms + inactivity_timeout_ms`.
    pub expired_at_ms: i64,
}

/// What one detection did to the set of live tracks.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub track: Track,
    pub is_new: bool,
    /// Labels the track carried before this detection refined them.
    pub relabeled_from: Option<(AgeBand, Gender)>,
    /// Tracks evicted by this event's sweep, oldest expiry first.
    pub ended: Vec<EndedTrack>,
}

/// Live tracks of one session, keyed by tracker ID.
///
/// `expiry` mirrors `tracks` ordered by `(last_seen_ms, track_id)`, so a
/// sweep only visits the tracks it evicts.
#[derive(Debug)]
pub struct TrackDeduplicator {
    inactivity_timeout_ms: i64,
    tracks: HashMap<String, Track>,
    expiry: BTreeSet<(i64, String)>,
}

impl TrackDeduplicator {
    pub fn new(inactivity_timeout_ms: i64) -> Self {
        Self {
            inactivity_timeout_ms,
            tracks: HashMap::new(),
            expiry: BTreeSet::new(),
        }
    }

    /// Fold one detection in. `now_ms` is the stream clock used for eviction.
    pub fn observe(&mut self, event: &DetectionEvent, now_ms: i64) -> DedupOutcome {
        let ended = self.sweep(now_ms);

        match self.tracks.get_mut(&event.track_id) {
            Some(track) => {
                // Only a frame at least as recent as the last one may relabel.
                let is_latest = event.timestamp_ms >= track.last_seen_ms;
                if event.timestamp_ms > track.last_seen_ms {
                    self.expiry
                        .remove(&(track.last_seen_ms, track.track_id.clone()));
                    self.expiry
                        .insert((event.timestamp_ms, track.track_id.clone()));
                    track.last_seen_ms = event.timestamp_ms;
                }
                let previous = (track.age_band, track.gender);
                let relabeled_from = if is_latest && previous != (event.age_band, event.gender) {
                    tracing::debug!(
                        "Track '{}' relabeled {}/{} -> {}/{}",
                        track.track_id,
                        previous.0,
                        previous.1,
                        event.age_band,
                        event.gender
                    );
                    track.age_band = event.age_band;
                    track.gender = event.gender;
                    Some(previous)
                } else {
                    None
                };

                DedupOutcome {
                    track: track.clone(),
                    is_new: false,
                    relabeled_from,
                    ended,
                }
            }
            None => {
                let track = Track {
                    track_id: event.track_id.clone(),
                    first_seen_ms: event.timestamp_ms,
                    last_seen_ms: event.timestamp_ms,
                    age_band: event.age_band,
                    gender: event.gender,
                };
                self.expiry
                    .insert((track.last_seen_ms, track.track_id.clone()));
                self.tracks.insert(track.track_id.clone(), track.clone());

                DedupOutcome {
                    track,
                    is_new: true,
                    relabeled_from: None,
                    ended,
                }
            }
        }
    }

    /// Evict every track silent for longer than the inactivity timeout,
    /// oldest expiry first.
    pub fn sweep(&mut self, now_ms: i64) -> Vec<EndedTrack> {
        let timeout = self.inactivity_timeout_ms;
        let mut ended = Vec::new();

        while let Some((last_seen_ms, _)) = self.expiry.first() {
            if now_ms.saturating_sub(*last_seen_ms) <= timeout {
                break;
            }
            let Some((_, track_id)) = self.expiry.pop_first() else {
                break;
            };
            if let Some(track) = self.tracks.remove(&track_id) {
                ended.push(EndedTrack {
                    expired_at_ms: track.last_seen_ms.saturating_add(timeout),
                    track,
                });
            }
        }
        ended
    }

    /// Release every live track, e.g. when the session ends.
    pub fn drain(&mut self) -> Vec<Track> {
        self.expiry.clear();
        let mut tracks: Vec<Track> = self.tracks.drain().map(|(_, t)| t).collect();
        tracks.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        tracks
    }

    pub fn get(&self, track_id: &str) -> Option<&Track> {
        self.tracks.get(track_id)
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(id: &str, ts: i64, age: AgeBand, gender: Gender) -> DetectionEvent {
        DetectionEvent::new(id, ts, age, gender)
    }

    #[test]
    fn test_repeat_detections_collapse() {
        let mut dedup = TrackDeduplicator::new(2_000);
        let first = dedup.observe(&det("1", 0, AgeBand::From18To34, Gender::Male), 0);
        assert!(first.is_new);

        let again = dedup.observe(&det("1", 300, AgeBand::From18To34, Gender::Male), 300);
        assert!(!again.is_new);
        assert_eq!(again.track.first_seen_ms, 0);
        assert_eq!(again.track.last_seen_ms, 300);
        assert!(again.relabeled_from.is_none());
        assert_eq!(dedup.active_count(), 1);
    }

    #[test]
    fn test_most_recent_label_wins() {
        let mut dedup = TrackDeduplicator::new(2_000);
        dedup.observe(&det("1", 0, AgeBand::From18To34, Gender::Unknown), 0);
        let refined = dedup.observe(&det("1", 100, AgeBand::From35To54, Gender::Female), 100);

        assert_eq!(
            refined.relabeled_from,
            Some((AgeBand::From18To34, Gender::Unknown))
        );
        let track = dedup.get("1").unwrap();
        assert_eq!(track.age_band, AgeBand::From35To54);
        assert_eq!(track.gender, Gender::Female);
    }

    #[test]
    fn test_sweep_evicts_after_timeout() {
        let mut dedup = TrackDeduplicator::new(2_000);
        dedup.observe(&det("1", 0, AgeBand::Under18, Gender::Female), 0);
        dedup.observe(&det("2", 1_500, AgeBand::Over55, Gender::Male), 1_500);

        // Exactly at the timeout the track is still live.
        let out = dedup.observe(&det("2", 2_000, AgeBand::Over55, Gender::Male), 2_000);
        assert!(out.ended.is_empty());

        let out = dedup.observe(&det("2", 2_001, AgeBand::Over55, Gender::Male), 2_001);
        assert_eq!(out.ended.len(), 1);
        assert_eq!(out.ended[0].track.track_id, "1");
        assert_eq!(out.ended[0].expired_at_ms, 2_000);
        assert!(dedup.get("1").is_none());
    }

    #[test]
    fn test_reappearance_after_eviction_is_new() {
        let mut dedup = TrackDeduplicator::new(1_000);
        dedup.observe(&det("9", 0, AgeBand::Under18, Gender::Male), 0);
        let back = dedup.observe(&det("9", 5_000, AgeBand::Under18, Gender::Male), 5_000);

        assert!(back.is_new);
        assert_eq!(back.ended.len(), 1);
        assert_eq!(back.ended[0].track.track_id, "9");
        assert_eq!(back.track.first_seen_ms, 5_000);
    }

    #[test]
    fn test_out_of_order_keeps_last_seen_monotone() {
        let mut dedup = TrackDeduplicator::new(2_000);
        dedup.observe(&det("1", 1_000, AgeBand::Under18, Gender::Male), 1_000);
        let out = dedup.observe(&det("1", 800, AgeBand::Under18, Gender::Male), 1_000);
        assert_eq!(out.track.last_seen_ms, 1_000);
    }

    #[test]
    fn test_older_frame_keeps_newer_labels() {
        let mut dedup = TrackDeduplicator::new(2_000);
        dedup.observe(&det("1", 0, AgeBand::Under18, Gender::Unknown), 0);
        dedup.observe(&det("1", 400, AgeBand::From35To54, Gender::Female), 400);

        let late = dedup.observe(&det("1", 300, AgeBand::Under18, Gender::Unknown), 400);
        assert!(late.relabeled_from.is_none());
        assert_eq!(late.track.age_band, AgeBand::From35To54);
        assert_eq!(late.track.gender, Gender::Female);
        assert_eq!(late.track.last_seen_ms, 400);

        // A frame stamped the same instant still refines.
        let same = dedup.observe(&det("1", 400, AgeBand::From35To54, Gender::Male), 400);
        assert_eq!(
            same.relabeled_from,
            Some((AgeBand::From35To54, Gender::Female))
        );
    }

    #[test]
    fn test_sweep_orders_by_expiry_and_keeps_refreshed_tracks() {
        let mut dedup = TrackDeduplicator::new(1_000);
        dedup.observe(&det("b", 0, AgeBand::Under18, Gender::Male), 0);
        dedup.observe(&det("a", 0, AgeBand::Under18, Gender::Male), 0);
        dedup.observe(&det("c", 200, AgeBand::Under18, Gender::Male), 200);
        dedup.observe(&det("b", 900, AgeBand::Under18, Gender::Male), 900);

        let ended = dedup.sweep(1_500);
        let ids: Vec<&str> = ended.iter().map(|e| e.track.track_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(ended[0].expired_at_ms, 1_000);
        assert_eq!(ended[1].expired_at_ms, 1_200);
        assert!(dedup.get("b").is_some());

        assert_eq!(dedup.sweep(2_000).len(), 1);
        assert_eq!(dedup.active_count(), 0);
        assert!(dedup.sweep(10_000).is_empty());
    }

    #[test]
    fn test_drain_releases_everything() {
        let mut dedup = TrackDeduplicator::new(2_000);
        dedup.observe(&det("b", 0, AgeBand::Under18, Gender::Male), 0);
        dedup.observe(&det("a", 10, AgeBand::Under18, Gender::Male), 10);
        let drained = dedup.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].track_id, "a");
        assert_eq!(dedup.active_count(), 0);
    }
}
