//! Per-worker background task: leader check and reconciliation.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::health::{leader, ReconcileReport, WorkerId};
use crate::net::Connector;
use crate::observability::metrics;
use crate::store::SharedStore;
use crate::upstream::Upstream;

impl<S: SharedStore, C: Connector> Upstream<S, C> {
    /// Register `worker` as the background leader and start its periodic
    /// tick. The task exits when `shutdown` fires.
    pub fn init_background_thread(
        &self,
        worker: WorkerId,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let upstream = self.clone();
        tokio::spawn(async move {
            if let Err(e) = leader::register(&upstream.registry, worker, upstream.clock.now()) {
                tracing::warn!(upstream = %upstream.id(), worker = %worker, error = %e, "Worker registration failed");
                metrics::record_background_error(e.kind());
            }

            let period = upstream.settings.reconcile_interval;
            tracing::info!(
                upstream = %upstream.id(),
                worker = %worker,
                interval_secs = period.as_secs(),
                "Background task starting"
            );

            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        upstream.background_tick(worker).await;
                    }
                    _ = shutdown.recv() => {
                        tracing::info!(upstream = %upstream.id(), worker = %worker, "Background task received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    /// One background tick. Returns the reconcile report when `worker` led
    /// and the pass completed.
    pub async fn background_tick(&self, worker: WorkerId) -> Option<ReconcileReport> {
        let now = self.clock.now();
        let stale_after = self.settings.leader_stale_after.as_secs();

        let leadership = match leader::check(&self.registry, worker, now, stale_after).await {
            Ok(leadership) => leadership,
            Err(e) => {
                tracing::warn!(upstream = %self.id(), worker = %worker, error = %e, "Leader check failed");
                metrics::record_background_error(e.kind());
                return None;
            }
        };
        metrics::record_leadership(&worker.to_string(), leadership.is_leader());
        if !leadership.is_leader() {
            tracing::trace!(upstream = %self.id(), worker = %worker, ?leadership, "Not the leader, skipping reconcile");
            return None;
        }

        match self.reconcile().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(upstream = %self.id(), worker = %worker, error = %e, "Reconcile pass failed");
                metrics::record_background_error(e.kind());
                None
            }
        }
    }
}
