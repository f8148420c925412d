//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → workers stop accepting, background tasks exit
//!     → main awaits every worker handle
//! ```
//!
//! # Design Decisions
//! - One broadcast reaches every worker and background task
//! - In-flight forwards finish on their own; their failure commits are
//!   detached tasks and are not awaited

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
