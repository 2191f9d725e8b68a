//! Atomic lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::MetricsSnapshot;

/// Counters updated by the worker as loads move through their lifecycle.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    loads_started: AtomicU64,
    loads_loaded: AtomicU64,
    loads_empty: AtomicU64,
    loads_aborted: AtomicU64,
    loads_failed: AtomicU64,
    reloads_restarted: AtomicU64,
    reloads_deferred: AtomicU64,
    reloads_superseded: AtomicU64,
    reloads_cancelled: AtomicU64,
    buckets_built: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A load delivered a payload with `buckets` buckets.
    pub fn load_loaded(&self, buckets: usize) {
        self.loads_loaded.fetch_add(1, Ordering::Relaxed);
        self.buckets_built
            .fetch_add(buckets as u64, Ordering::Relaxed);
    }

    pub fn load_empty(&self) {
        self.loads_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_aborted(&self) {
        self.loads_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reload_restarted(&self) {
        self.reloads_restarted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reload_deferred(&self) {
        self.reloads_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reload_superseded(&self) {
        self.reloads_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reload_cancelled(&self) {
        self.reloads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_loaded: self.loads_loaded.load(Ordering::Relaxed),
            loads_empty: self.loads_empty.load(Ordering::Relaxed),
            loads_aborted: self.loads_aborted.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            reloads_restarted: self.reloads_restarted.load(Ordering::Relaxed),
            reloads_deferred: self.reloads_deferred.load(Ordering::Relaxed),
            reloads_superseded: self.reloads_superseded.load(Ordering::Relaxed),
            reloads_cancelled: self.reloads_cancelled.load(Ordering::Relaxed),
            buckets_built: self.buckets_built.load(Ordering::Relaxed),
        }
    }
}
