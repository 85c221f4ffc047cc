//! # Run Statistics
//!
//! Lock-free counters updated by partition pipelines and the aggregator,
//! readable at any time while a run is in progress.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct ProcessorStats {
    batches_read: AtomicU64,
    events_handled: AtomicU64,
    progress_reports: AtomicU64,
    partitions_completed: AtomicU64,
    partitions_failed: AtomicU64,
    last_progress_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`ProcessorStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStatsSnapshot {
    pub batches_read: u64,
    pub events_handled: u64,
    pub progress_reports: u64,
    pub partitions_completed: u64,
    pub partitions_failed: u64,
    pub last_progress_at: Option<DateTime<Utc>>,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&self) {
        self.batches_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_report(&self) {
        self.progress_reports.fetch_add(1, Ordering::Relaxed);
        *self.last_progress_at.lock() = Some(Utc::now());
    }

    pub fn record_partition_completed(&self) {
        self.partitions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partition_failed(&self) {
        self.partitions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            batches_read: self.batches_read.load(Ordering::Relaxed),
            events_handled: self.events_handled.load(Ordering::Relaxed),
            progress_reports: self.progress_reports.load(Ordering::Relaxed),
            partitions_completed: self.partitions_completed.load(Ordering::Relaxed),
            partitions_failed: self.partitions_failed.load(Ordering::Relaxed),
            last_progress_at: *self.last_progress_at.lock(),
        }
    }
}
