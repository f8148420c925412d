//! Upstream instance.
//!
//! # Data Flow
//! ```text
//! Request path (per unit of work):
//!     begin() → UnitOfWork
//!     → connect(): registry read (cached, no lock) → pools in priority order
//!       → strategy picks a live host → Connector → failures recorded locally
//!     → post_process(): FailureRecord handed to a detached commit task
//!
//! Background (per worker):
//!     init_background_thread(): register → tick every reconcile_interval
//!     → leader check → reconcile (leader only)
//! ```
//!
//! # Design Decisions
//! - The request path never waits on the instance lock
//! - Every instance (id) has its own keys and lock in the shared store
//! - `Upstream` is cheap to clone; each worker task holds its own clone

pub mod admin;
pub mod background;
pub mod context;
pub mod dispatch;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::error::UpstreamResult;
use crate::health::{self, CommitReport, FailureRecord};
use crate::load_balancer::PoolTable;
use crate::net::Connector;
use crate::observability::metrics;
use crate::store::SharedStore;

pub use context::UnitOfWork;
pub use dispatch::Selected;
pub use registry::{LockedPools, PoolRegistry};

/// Background timing of an upstream instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Period of the background tick.
    pub reconcile_interval: Duration,
    /// Heartbeat age after which a follower takes leadership over.
    pub leader_stale_after: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            leader_stale_after: Duration::from_secs(180),
        }
    }
}

/// One logical upstream: prioritized pools of hosts in a shared store.
pub struct Upstream<S, C> {
    registry: PoolRegistry<S>,
    connector: Arc<C>,
    clock: Arc<dyn Clock>,
    settings: UpstreamSettings,
}

impl<S, C> Clone for Upstream<S, C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            connector: Arc::clone(&self.connector),
            clock: Arc::clone(&self.clock),
            settings: self.settings,
        }
    }
}

impl<S: SharedStore, C: Connector> Upstream<S, C> {
    /// Open upstream `id` on `store`.
    ///
    /// The flag is `false` while the instance has no pools yet; the caller is
    /// expected to seed them (see [`Upstream::seed_pools`]).
    pub fn new(store: Arc<S>, connector: C, id: &str) -> UpstreamResult<(Self, bool)> {
        let (registry, configured) = PoolRegistry::open(store, id)?;
        let upstream = Self {
            registry,
            connector: Arc::new(connector),
            clock: Arc::new(SystemClock),
            settings: UpstreamSettings::default(),
        };
        Ok((upstream, configured))
    }

    pub fn with_settings(mut self, settings: UpstreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id(&self) -> &str {
        self.registry.id()
    }

    pub fn registry(&self) -> &PoolRegistry<S> {
        &self.registry
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    /// Start a unit of work.
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new()
    }

    /// Lock the instance and read the latest pool table.
    pub async fn get_locked_pools(&self) -> UpstreamResult<LockedPools<S>> {
        self.registry.get_locked_pools().await
    }

    /// Persist `pools` and make them the view of this unit of work.
    pub fn save_pools(&self, ctx: &mut UnitOfWork, pools: PoolTable) -> UpstreamResult<()> {
        self.registry.save_pools(&pools)?;
        ctx.cache(pools, None);
        Ok(())
    }

    /// Recompute and persist the priority index of `pools`.
    pub fn sort_pools(&self, ctx: &mut UnitOfWork, pools: &PoolTable) -> UpstreamResult<()> {
        let index = self.registry.sort_pools(pools)?;
        ctx.priority = Some(Arc::new(index));
        Ok(())
    }

    /// Finish a unit of work.
    ///
    /// Failures recorded during it are committed by a detached task, so the
    /// commit survives the caller going away. Returns the task handle, or
    /// `None` when there was nothing to commit.
    pub fn post_process(&self, ctx: UnitOfWork) -> Option<JoinHandle<()>> {
        let record = ctx.into_failures();
        if record.is_empty() {
            return None;
        }
        let upstream = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = upstream.commit(&record).await {
                tracing::warn!(
                    upstream = %upstream.id(),
                    failures = record.len(),
                    error = %e,
                    "Failed to commit host failures"
                );
                metrics::record_background_error(e.kind());
            }
        }))
    }

    /// Commit a failure record now.
    pub async fn commit(&self, record: &FailureRecord) -> UpstreamResult<CommitReport> {
        health::commit_failures(&self.registry, record, self.clock.now()).await
    }

    /// Run one reconciliation pass now, regardless of leadership.
    pub async fn reconcile(&self) -> UpstreamResult<health::ReconcileReport> {
        health::reconcile(&self.registry, self.clock.now()).await
    }
}
