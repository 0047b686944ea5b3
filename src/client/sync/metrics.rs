//! # Sync Metrics
//!
//! Counters for cycles and queue items. Dropped items and failed cycles are
//! counted here so they stay observable after the log line scrolls away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    cycles_started: AtomicU64,
    cycles_succeeded: AtomicU64,
    cycles_failed: AtomicU64,
    items_delivered: AtomicU64,
    items_dropped: AtomicU64,
    last_cycle_millis: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub items_delivered: u64,
    pub items_dropped: u64,
    pub last_cycle_duration: Duration,
}

impl MetricsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.cycles_started == 0 {
            0.0
        } else {
            self.cycles_succeeded as f64 / self.cycles_started as f64
        }
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle_start(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_success(&self, duration: Duration) {
        self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_cycle_failure(&self, duration: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_items(&self, delivered: usize, dropped: usize) {
        self.items_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.items_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    fn record_duration(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.last_cycle_millis.store(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_succeeded: self.cycles_succeeded.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            last_cycle_duration: Duration::from_millis(self.last_cycle_millis.load(Ordering::Relaxed)),
        }
    }
}
