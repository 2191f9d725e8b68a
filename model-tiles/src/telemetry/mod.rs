//! Worker telemetry for observability.
//!
//! Lock-free atomic counters recorded at each lifecycle transition, with a
//! point-in-time snapshot for display.
//!
//! # Architecture
//!
//! ```text
//! Worker transitions ─────► WorkerMetrics ─────► MetricsSnapshot ─────► Views
//!                           (atomic counters)    (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let snapshot = worker.metrics();
//! println!("Tiles loaded: {}", snapshot.loads_loaded);
//! ```

mod metrics;
mod snapshot;

pub use metrics::WorkerMetrics;
pub use snapshot::MetricsSnapshot;
