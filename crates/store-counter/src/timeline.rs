//! Append-only store of sealed buckets with bounded retention.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::demographics::{AgeHistogram, GenderHistogram};
use crate::types::{Bucket, SessionTotals};

/// Aggregate of the oldest buckets, folded away once retention is exceeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactedSummary {
    pub bucket_count: u64,
    pub first_index: u64,
    pub last_index: u64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub total_delta: u64,
    pub age_histogram: AgeHistogram,
    pub gender_histogram: GenderHistogram,
    pub peak_current_count: u64,
}

impl CompactedSummary {
    fn fold(&mut self, bucket: &Bucket) {
        if self.bucket_count == 0 {
            self.first_index = bucket.index;
            self.start_ms = bucket.start_ms;
        }
        self.bucket_count += 1;
        self.last_index = bucket.index;
        self.end_ms = bucket.end_ms;
        self.total_delta += bucket.total_delta;
        self.age_histogram.merge(&bucket.age_histogram);
        self.gender_histogram.merge(&bucket.gender_histogram);
        self.peak_current_count = self.peak_current_count.max(bucket.current_count);
    }
}

#[derive(Debug)]
struct TimelineInner {
    window_ms: i64,
    origin_ms: Option<i64>,
    /// Absolute index of `buckets[0]`.
    first_index: u64,
    buckets: VecDeque<Arc<Bucket>>,
    compacted: Option<CompactedSummary>,
    max_buckets: usize,
}

impl TimelineInner {
    fn position(&self, index: u64) -> Option<usize> {
        let offset = index.checked_sub(self.first_index)?;
        let offset = usize::try_from(offset).ok()?;
        (offset < self.buckets.len()).then_some(offset)
    }

    fn next_index(&self) -> u64 {
        self.first_index + self.buckets.len() as u64
    }
}

/// Sealed history of one session.
///
/// Cloning is cheap and every clone sees the same buckets. One writer (the
/// session's ingest pipeline) appends; any number of readers query.
#[derive(Debug, Clone)]
pub struct TimelineStore {
    inner: Arc<RwLock<TimelineInner>>,
}

impl TimelineStore {
    pub fn new(window_ms: i64, max_buckets: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TimelineInner {
                window_ms,
                origin_ms: None,
                first_index: 0,
                buckets: VecDeque::new(),
                compacted: None,
                max_buckets: max_buckets.max(1),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TimelineInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimelineInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fix the session origin. Later calls are ignored.
    pub fn set_origin(&self, origin_ms: i64) {
        let mut inner = self.write();
        if inner.origin_ms.is_none() {
            inner.origin_ms = Some(origin_ms);
        }
    }

    /// Publish a sealed bucket. Buckets must arrive in index order.
    pub fn append(&self, bucket: Bucket) -> Arc<Bucket> {
        let bucket = Arc::new(bucket);
        let mut inner = self.write();

        if inner.origin_ms.is_none() {
            inner.origin_ms = Some(bucket.start_ms - bucket.index as i64 * inner.window_ms);
        }
        if inner.buckets.is_empty() && inner.compacted.is_none() {
            inner.first_index = bucket.index;
        }
        debug_assert_eq!(bucket.index, inner.next_index(), "non-contiguous bucket");

        inner.buckets.push_back(Arc::clone(&bucket));

        while inner.buckets.len() > inner.max_buckets {
            let Some(oldest) = inner.buckets.pop_front() else {
                break;
            };
            inner.first_index += 1;
            let summary = inner.compacted.get_or_insert_with(CompactedSummary::default);
            summary.fold(&oldest);
            tracing::trace!(
                "Folded bucket {} into summary ({} compacted)",
                oldest.index,
                summary.bucket_count
            );
        }

        bucket
    }

    pub fn get(&self, index: u64) -> Option<Arc<Bucket>> {
        let inner = self.read();
        inner.position(index).map(|pos| Arc::clone(&inner.buckets[pos]))
    }

    /// The retained bucket whose window contains `timestamp_ms`.
    pub fn locate(&self, timestamp_ms: i64) -> Option<Arc<Bucket>> {
        let inner = self.read();
        let origin = inner.origin_ms?;
        if timestamp_ms < origin {
            return None;
        }

        let index = ((timestamp_ms - origin) / inner.window_ms) as u64;
        if let Some(pos) = inner.position(index) {
            let bucket = &inner.buckets[pos];
            if bucket.contains(timestamp_ms) {
                return Some(Arc::clone(bucket));
            }
        }

        let pos = inner.buckets.partition_point(|b| b.end_ms <= timestamp_ms);
        inner
            .buckets
            .get(pos)
            .filter(|b| b.contains(timestamp_ms))
            .map(Arc::clone)
    }

    /// Retained buckets overlapping `[from_ms, to_ms)`, oldest first.
    pub fn range(&self, from_ms: i64, to_ms: i64) -> BucketRange {
        let inner = self.read();
        let (start, end) = match inner.origin_ms {
            Some(origin) if to_ms > from_ms && !inner.buckets.is_empty() => {
                let window = inner.window_ms;
                let first = inner.first_index;
                let last = inner.next_index();
                let lo = (from_ms.saturating_sub(origin).max(0) / window) as u64;
                let span = to_ms.saturating_sub(origin).max(0);
                let hi = span / window + i64::from(span % window != 0);
                (lo.max(first), (hi as u64).min(last))
            }
            _ => (0, 0),
        };

        BucketRange {
            store: self.clone(),
            start,
            next: start,
            end: end.max(start),
        }
    }

    pub fn latest_sealed(&self) -> Option<Arc<Bucket>> {
        self.read().buckets.back().map(Arc::clone)
    }

    /// Number of retained (not compacted) buckets.
    pub fn len(&self) -> usize {
        self.read().buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().buckets.is_empty()
    }

    pub fn origin_ms(&self) -> Option<i64> {
        self.read().origin_ms
    }

    pub fn window_ms(&self) -> i64 {
        self.read().window_ms
    }

    /// End of the sealed history, retained or compacted.
    pub fn sealed_until_ms(&self) -> Option<i64> {
        let inner = self.read();
        inner
            .buckets
            .back()
            .map(|b| b.end_ms)
            .or_else(|| inner.compacted.as_ref().map(|c| c.end_ms))
    }

    /// Start of the oldest retained bucket.
    pub fn retained_from_ms(&self) -> Option<i64> {
        self.read().buckets.front().map(|b| b.start_ms)
    }

    pub fn compacted(&self) -> Option<CompactedSummary> {
        self.read().compacted.clone()
    }

    /// Rebuild session totals from the sealed history alone.
    pub fn recompute_totals(&self) -> SessionTotals {
        let inner = self.read();
        let mut totals = SessionTotals::default();
        if let Some(summary) = &inner.compacted {
            totals.total_count = summary.total_delta;
            totals.age_histogram.merge(&summary.age_histogram);
            totals.gender_histogram.merge(&summary.gender_histogram);
        }
        for bucket in &inner.buckets {
            totals.total_count += bucket.total_delta;
            totals.age_histogram.merge(&bucket.age_histogram);
            totals.gender_histogram.merge(&bucket.gender_histogram);
        }
        totals
    }
}

/// Lazy walk over a span of bucket indices.
///
/// Each step takes the read lock briefly, so ingestion keeps running while a
/// caller iterates. Buckets compacted away mid-walk are skipped. Cloning
/// restarts from the beginning of the span.
#[derive(Debug)]
pub struct BucketRange {
    store: TimelineStore,
    start: u64,
    next: u64,
    end: u64,
}

impl BucketRange {
    /// Start over from the first bucket of the span.
    pub fn restart(&mut self) {
        self.next = self.start;
    }
}

impl Clone for BucketRange {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            start: self.start,
            next: self.start,
            end: self.end,
        }
    }
}

impl Iterator for BucketRange {
    type Item = Arc<Bucket>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            if let Some(bucket) = self.store.get(index) {
                return Some(bucket);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, usize::try_from(self.end - self.next).ok())
    }
}
