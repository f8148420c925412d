//! Error taxonomy for upstream selection and health maintenance.
//!
//! # Propagation
//! - `Config` and `BrokenState` are terminal for the calling operation
//! - `Lock` and `Persist` stay inside the committer/reconciler; they are
//!   logged and retried on the next scheduled trigger
//! - `Connection` stays inside the dispatcher's failover loop and only
//!   escapes once every pool and host has been exhausted

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced by an upstream instance.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Invalid construction input (empty instance id, unreachable store, bad seed).
    #[error("configuration error: {0}")]
    Config(String),

    /// The instance lock could not be acquired or released.
    #[error("lock error: {0}")]
    Lock(#[source] StoreError),

    /// The pool table or priority index is absent or cannot be decoded.
    #[error("broken upstream state: {0}")]
    BrokenState(String),

    /// Transport failure or timeout against a specific host.
    #[error("connection to {host} in pool {pool} failed: {source}")]
    Connection {
        pool: String,
        host: String,
        #[source]
        source: io::Error,
    },

    /// Every pool was down or had no live host left; nothing was attempted.
    #[error("no live upstream hosts")]
    NoLiveHosts,

    /// Writing the pool table or priority index failed.
    #[error("persist error: {0}")]
    Persist(#[source] StoreError),

    /// An administrative operation named a pool or host that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl UpstreamError {
    /// Whether the error is contained within a background cycle rather than
    /// surfaced to the request path.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Lock(_) | Self::Persist(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Lock(_) => "lock",
            Self::BrokenState(_) => "broken_state",
            Self::Connection { .. } => "connection",
            Self::NoLiveHosts => "no_live_hosts",
            Self::Persist(_) => "persist",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
