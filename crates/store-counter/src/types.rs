//! Core data types for detections, buckets, totals, and scene snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::demographics::{AgeHistogram, DemographicBreakdown, GenderHistogram};

/// Identifier of one counting session (one video source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Allocate a fresh random session ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Where the detections of a session come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Webcam,
    Upload,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Webcam => f.write_str("webcam"),
            SourceKind::Upload => f.write_str("upload"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webcam" | "camera" | "live" => Ok(SourceKind::Webcam),
            "upload" | "file" | "video" => Ok(SourceKind::Upload),
            other => Err(format!(
                "Unsupported source kind: {other}. Use 'webcam' or 'upload'."
            )),
        }
    }
}

/// Age band assigned by the demographic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "0-17")]
    Under18,
    #[serde(rename = "18-34")]
    From18To34,
    #[serde(rename = "35-54")]
    From35To54,
    #[serde(rename = "55+")]
    Over55,
}

impl AgeBand {
    pub const ALL: [AgeBand; 4] = [
        AgeBand::Under18,
        AgeBand::From18To34,
        AgeBand::From35To54,
        AgeBand::Over55,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgeBand::Under18 => "0-17",
            AgeBand::From18To34 => "18-34",
            AgeBand::From35To54 => "35-54",
            AgeBand::Over55 => "55+",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AgeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0-17" => Ok(AgeBand::Under18),
            "18-34" => Ok(AgeBand::From18To34),
            "35-54" => Ok(AgeBand::From35To54),
            "55+" => Ok(AgeBand::Over55),
            other => Err(format!("unknown age band '{other}'")),
        }
    }
}

/// Gender label assigned by the demographic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Unknown];

    /// Labels reported as demographic shares. `Unknown` only widens the denominator.
    pub const REPORTED: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "unknown" | "" => Ok(Gender::Unknown),
            other => Err(format!("unknown gender label '{other}'")),
        }
    }
}

/// A pixel-space bounding box, passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One labelled person detection for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub track_id: String,
    pub timestamp_ms: i64,
    pub age_band: AgeBand,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl DetectionEvent {
    pub fn new(
        track_id: impl Into<String>,
        timestamp_ms: i64,
        age_band: AgeBand,
        gender: Gender,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            timestamp_ms,
            age_band,
            gender,
            bounding_box: None,
            confidence: None,
        }
    }
}

/// Wire form of a detection as emitted by the detection pipeline.
///
/// Labels arrive as free text; [`RawDetection::parse`] turns malformed input
/// into [`IngestError::CorruptEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub track_id: String,
    pub timestamp_ms: i64,
    pub age_band: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl RawDetection {
    pub fn parse(self) -> Result<DetectionEvent, IngestError> {
        if self.track_id.trim().is_empty() {
            return Err(IngestError::CorruptEvent("empty track id".to_string()));
        }
        if self.timestamp_ms < 0 {
            return Err(IngestError::CorruptEvent(format!(
                "negative timestamp {}ms",
                self.timestamp_ms
            )));
        }
        let age_band = self.age_band.parse().map_err(IngestError::CorruptEvent)?;
        let gender = match self.gender.as_deref() {
            Some(label) => label.parse().map_err(IngestError::CorruptEvent)?,
            None => Gender::Unknown,
        };

        Ok(DetectionEvent {
            track_id: self.track_id,
            timestamp_ms: self.timestamp_ms,
            age_band,
            gender,
            bounding_box: self.bounding_box,
            confidence: self.confidence,
        })
    }
}

/// A fixed-width time window of aggregated counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub index: u64,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Tracks present at the bucket's last update.
    pub current_count: u64,
    /// Tracks first seen inside this window.
    pub total_delta: u64,
    /// Session total as of the bucket's last update.
    pub running_total: u64,
    pub age_histogram: AgeHistogram,
    pub gender_histogram: GenderHistogram,
    /// Labels of the tracks counted in `current_count`.
    pub active_age: AgeHistogram,
    pub active_gender: GenderHistogram,
}

impl Bucket {
    pub fn empty(index: u64, start_ms: i64, window_ms: i64) -> Self {
        Self {
            index,
            start_ms,
            end_ms: start_ms.saturating_add(window_ms),
            current_count: 0,
            total_delta: 0,
            running_total: 0,
            age_histogram: AgeHistogram::default(),
            gender_histogram: GenderHistogram::default(),
            active_age: AgeHistogram::default(),
            active_gender: GenderHistogram::default(),
        }
    }

    /// Whether `timestamp_ms` lies in `[start_ms, end_ms)`.
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }

    pub fn window(&self) -> BucketWindow {
        BucketWindow {
            index: self.index,
            start_ms: self.start_ms,
            end_ms: self.end_ms,
        }
    }
}

/// Position of a bucket on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketWindow {
    pub index: u64,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl BucketWindow {
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }
}

/// Cumulative session counts, kept as a running cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub total_count: u64,
    pub age_histogram: AgeHistogram,
    pub gender_histogram: GenderHistogram,
}

impl SessionTotals {
    pub fn record_new(&mut self, age_band: AgeBand, gender: Gender) {
        self.total_count += 1;
        self.age_histogram.increment(age_band);
        self.gender_histogram.increment(gender);
    }

    /// Demographic shares of everyone counted so far.
    pub fn breakdown(&self) -> DemographicBreakdown {
        DemographicBreakdown::from_histograms(
            &self.age_histogram,
            &self.gender_histogram,
            self.total_count,
        )
    }
}

/// Occupancy snapshot for one bucket or the live moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub session_id: SessionId,
    /// `None` until the first detection opens a bucket.
    pub window: Option<BucketWindow>,
    pub sealed: bool,
    pub current_count: u64,
    pub total_count: u64,
    pub total_delta: u64,
    pub demographics: DemographicBreakdown,
}

impl SceneState {
    /// The state of a session that has not recorded anything yet.
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            window: None,
            sealed: false,
            current_count: 0,
            total_count: 0,
            total_delta: 0,
            demographics: DemographicBreakdown::from_histograms(
                &AgeHistogram::default(),
                &GenderHistogram::default(),
                0,
            ),
        }
    }

    pub fn from_bucket(session_id: SessionId, bucket: &Bucket, sealed: bool) -> Self {
        Self {
            session_id,
            window: Some(bucket.window()),
            sealed,
            current_count: bucket.current_count,
            total_count: bucket.running_total,
            total_delta: bucket.total_delta,
            demographics: DemographicBreakdown::from_histograms(
                &bucket.active_age,
                &bucket.active_gender,
                bucket.current_count,
            ),
        }
    }

    /// Whether this is the still-open bucket and covers `timestamp_ms`.
    pub fn open_at(&self, timestamp_ms: i64) -> bool {
        !self.sealed && self.window.is_some_and(|w| w.contains(timestamp_ms))
    }
}

/// Reasons a detection is dropped on the ingest path. None of them are fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Stale event: {timestamp_ms}ms is more than {max_skew_ms}ms behind watermark {watermark_ms}ms")]
    StaleEvent {
        timestamp_ms: i64,
        watermark_ms: i64,
        max_skew_ms: i64,
    },

    #[error("Late event: {timestamp_ms}ms falls in sealed history ending at {sealed_until_ms}ms")]
    LateEvent {
        timestamp_ms: i64,
        sealed_until_ms: i64,
    },

    #[error("Session closed: {0}")]
    SessionClosed(SessionId),

    #[error("Corrupt event: {0}")]
    CorruptEvent(String),
}

impl IngestError {
    /// Short machine-readable kind, used in ingest reports.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::StaleEvent { .. } => "stale_event",
            IngestError::LateEvent { .. } => "late_event",
            IngestError::SessionClosed(_) => "session_closed",
            IngestError::CorruptEvent(_) => "corrupt_event",
        }
    }
}

/// Reasons a timeline query cannot be answered.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Out of range: {timestamp_ms}ms is before the session start")]
    OutOfRange { timestamp_ms: i64 },

    #[error("Not yet recorded: {timestamp_ms}ms is beyond the latest data")]
    NotYetRecorded {
        timestamp_ms: i64,
        latest_ms: Option<i64>,
    },

    #[error("Compacted: {timestamp_ms}ms lies in history folded before {compacted_until_ms}ms")]
    Compacted {
        timestamp_ms: i64,
        compacted_until_ms: i64,
    },

    #[error("Invalid range: from {from_ms}ms to {to_ms}ms")]
    InvalidRange { from_ms: i64, to_ms: i64 },
}

/// Errors that can occur in the occupancy engine.
#[derive(thiserror::Error, Debug)]
pub enum CounterError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type CounterResult<T> = Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(age: &str, gender: Option<&str>) -> RawDetection {
        RawDetection {
            track_id: "7".to_string(),
            timestamp_ms: 120,
            age_band: age.to_string(),
            gender: gender.map(str::to_string),
            bounding_box: None,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_raw_detection_parses_labels() {
        let event = raw("35-54", Some("Female")).parse().unwrap();
        assert_eq!(event.age_band, AgeBand::From35To54);
        assert_eq!(event.gender, Gender::Female);
        assert_eq!(event.confidence, Some(0.9));
    }

    #[test]
    fn test_missing_gender_is_unknown() {
        let event = raw("55+", None).parse().unwrap();
        assert_eq!(event.gender, Gender::Unknown);
    }

    #[test]
    fn test_corrupt_labels_rejected() {
        let err = raw("teen", Some("male")).parse().unwrap_err();
        assert_eq!(err.kind(), "corrupt_event");

        let err = raw("18-34", Some("robot")).parse().unwrap_err();
        assert!(matches!(err, IngestError::CorruptEvent(_)));

        let mut negative = raw("18-34", None);
        negative.timestamp_ms = -1;
        assert!(matches!(negative.parse(), Err(IngestError::CorruptEvent(_))));
    }

    #[test]
    fn test_wire_labels() {
        let json = serde_json::to_value(AgeBand::Over55).unwrap();
        assert_eq!(json, "55+");
        let json = serde_json::to_value(Gender::Female).unwrap();
        assert_eq!(json, "female");
        let kind: SourceKind = serde_json::from_str("\"upload\"").unwrap();
        assert_eq!(kind, SourceKind::Upload);
    }

    #[test]
    fn test_session_id_roundtrip_text() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_empty_scene_has_zero_shares() {
        let scene = SceneState::empty(SessionId::new());
        assert_eq!(scene.current_count, 0);
        assert!(scene.demographics.age.iter().all(|s| s.percent == 0));
        assert!(scene.demographics.gender.iter().all(|s| s.percent == 0));
    }
}
