use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_fetched: AtomicU64,
    records_rejected: AtomicU64,
    records_filtered: AtomicU64,
    rows_inserted: AtomicU64,
    rows_updated: AtomicU64,
    rows_skipped: AtomicU64,
    chunks_committed: AtomicU64,
    retry_count: AtomicU64,
    failure_count: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_fetched: u64,
    pub records_rejected: u64,
    pub records_filtered: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    pub chunks_committed: u64,
    pub retry_count: u64,
    pub failure_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_fetched(&self, count: u64) {
        self.inner
            .records_fetched
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self, count: u64) {
        self.inner
            .records_rejected
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_filtered(&self, count: u64) {
        self.inner
            .records_filtered
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_merge(&self, inserted: u64, updated: u64, skipped: u64) {
        self.inner.rows_inserted.fetch_add(inserted, Ordering::Relaxed);
        self.inner.rows_updated.fetch_add(updated, Ordering::Relaxed);
        self.inner.rows_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.inner.chunks_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_fetched: self.inner.records_fetched.load(Ordering::Relaxed),
            records_rejected: self.inner.records_rejected.load(Ordering::Relaxed),
            records_filtered: self.inner.records_filtered.load(Ordering::Relaxed),
            rows_inserted: self.inner.rows_inserted.load(Ordering::Relaxed),
            rows_updated: self.inner.rows_updated.load(Ordering::Relaxed),
            rows_skipped: self.inner.rows_skipped.load(Ordering::Relaxed),
            chunks_committed: self.inner.chunks_committed.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
        }
    }
}
