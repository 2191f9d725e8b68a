//! Point-in-time copy of worker counters.

use std::fmt;

/// Counter values captured by [`WorkerMetrics::snapshot`](super::WorkerMetrics::snapshot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub loads_started: u64,
    pub loads_loaded: u64,
    pub loads_empty: u64,
    pub loads_aborted: u64,
    pub loads_failed: u64,
    pub reloads_restarted: u64,
    pub reloads_deferred: u64,
    pub reloads_superseded: u64,
    pub reloads_cancelled: u64,
    pub buckets_built: u64,
}

impl MetricsSnapshot {
    /// Loads that reached any terminal outcome.
    pub fn loads_finished(&self) -> u64 {
        self.loads_loaded + self.loads_empty + self.loads_aborted + self.loads_failed
    }

    /// Loads started but not yet finished.
    pub fn loads_pending(&self) -> u64 {
        self.loads_started.saturating_sub(self.loads_finished())
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loads: {} started, {} loaded, {} empty, {} aborted, {} failed; \
             reloads: {} restarted, {} deferred, {} superseded, {} cancelled; \
             {} buckets",
            self.loads_started,
            self.loads_loaded,
            self.loads_empty,
            self.loads_aborted,
            self.loads_failed,
            self.reloads_restarted,
            self.reloads_deferred,
            self.reloads_superseded,
            self.reloads_cancelled,
            self.buckets_built
        )
    }
}
