//! Scheduler statistics

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the scheduler counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub jobs_enqueued: u64,
    /// Feed ids enqueued by the most recent tick
    pub last_enqueued: Vec<i64>,
    pub jobs_processed: u64,
    pub fetch_failures: u64,
    pub articles_inserted: u64,
    pub articles_skipped: u64,
    pub articles_failed: u64,
}

/// Live counters, updated by the tick loop and the workers
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    ticks: AtomicU64,
    jobs_enqueued: AtomicU64,
    last_enqueued: Mutex<Vec<i64>>,
    jobs_processed: AtomicU64,
    fetch_failures: AtomicU64,
    articles_inserted: AtomicU64,
    articles_skipped: AtomicU64,
    articles_failed: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self, ids: Vec<i64>) {
        self.jobs_enqueued.fetch_add(ids.len() as u64, Ordering::Relaxed);
        *self.last_enqueued.lock().unwrap_or_else(|e| e.into_inner()) = ids;
    }

    pub(crate) fn record_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inserted(&self) {
        self.articles_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.articles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.articles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            last_enqueued: self.last_enqueued.lock().map(|ids| ids.clone()).unwrap_or_default(),
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            articles_inserted: self.articles_inserted.load(Ordering::Relaxed),
            articles_skipped: self.articles_skipped.load(Ordering::Relaxed),
            articles_failed: self.articles_failed.load(Ordering::Relaxed),
        }
    }
}
