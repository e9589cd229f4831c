//! Store Counter: occupancy engine that turns per-frame person detections into live counts, demographics, and a scrubbable timeline.

pub mod aggregator;
pub mod config;
pub mod dedup;
pub mod demographics;
pub mod ingest;
pub mod publisher;
pub mod query;
pub mod registry;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod types;

pub use aggregator::BucketAggregator;
pub use config::EngineConfig;
pub use dedup::{DedupOutcome, EndedTrack, Track, TrackDeduplicator};
pub use demographics::{
    apportion, AgeHistogram, DemographicBreakdown, DemographicShare, GenderHistogram, Histogram,
};
pub use ingest::{IngestGateway, IngestStats};
pub use publisher::LivePublisher;
pub use query::QueryService;
pub use registry::SessionRegistry;
pub use session::{IngestReceipt, OccupancySession, SessionInfo, SessionSummary};
pub use storage::{BucketLog, BucketLogReader, BucketLogWriter, BucketRecord, LogHeader};
pub use timeline::{BucketRange, CompactedSummary, TimelineStore};
pub use types::*;
