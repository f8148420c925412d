//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, committer, reconciler, leader election
//!     → logging.rs (structured tracing events: upstream, pool, host, worker)
//!     → metrics.rs (counters and gauges, Prometheus exporter)
//! ```
//!
//! # Design Decisions
//! - Host state transitions log at info/warn, the hot path at debug
//! - Metric updates are fire-and-forget; with no recorder installed they are no-ops

pub mod logging;
pub mod metrics;
