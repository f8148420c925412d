//! Health reconciliation.
//!
//! # Responsibilities
//! - Scan every host of every pool under the instance lock
//! - Bring back hosts whose `failed_timeout` has elapsed
//!
//! This is the only path that recovers a failed host; the request path never
//! probes a down host.

use crate::error::UpstreamResult;
use crate::health::state;
use crate::observability::metrics;
use crate::store::SharedStore;
use crate::upstream::registry::PoolRegistry;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `(pool, host)` pairs brought back up.
    pub revived: Vec<(String, String)>,
}

/// Run one reconciliation pass at time `now`.
///
/// The table is only written when at least one host changed, so a second
/// pass with no new failures in between leaves the store untouched.
pub async fn reconcile<S: SharedStore>(
    registry: &PoolRegistry<S>,
    now: u64,
) -> UpstreamResult<ReconcileReport> {
    let mut locked = registry.get_locked_pools().await?;
    let mut report = ReconcileReport::default();

    for pool in locked.pools.iter_mut() {
        let failed_timeout = pool.failed_timeout;
        for host in pool.hosts.iter_mut() {
            if state::revive_if_due(host, failed_timeout, now) {
                tracing::info!(
                    upstream = %registry.id(),
                    pool = %pool.id,
                    host = %host.id,
                    address = %host.address(),
                    "Host revived"
                );
                metrics::record_host_revived(&pool.id);
                report.revived.push((pool.id.clone(), host.id.clone()));
            }
        }
    }

    if !report.revived.is_empty() {
        registry.save_pools(&locked.pools)?;
    }
    locked.unlock()?;
    Ok(report)
}
