//! Health maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! Passive failure tracking (passive.rs):
//!     Connect failure on the request path
//!     → FailureRecord of the unit of work (no lock)
//!     → post_process → commit_failures (instance lock)
//!     → state.rs: failcount/lastfail, down at max_fails
//!
//! Reconciliation (reconcile.rs):
//!     Background tick on the elected worker (leader.rs)
//!     → instance lock → state.rs: revive hosts past failed_timeout
//! ```
//!
//! # Design Decisions
//! - The request path only reads shared health state; writes happen after
//!   the request or on the background tick
//! - Down hosts recover by timeout only, there is no half-open probe
//! - Health state is per host, the pool `up` flag is an operator switch

pub mod leader;
pub mod passive;
pub mod reconcile;
pub mod state;

pub use leader::{Leadership, WorkerId};
pub use passive::{commit_failures, CommitReport, FailureRecord};
pub use reconcile::{reconcile, ReconcileReport};
