//! Connection dispatcher.
//!
//! Walks pools in priority order and connects to the first live host that
//! accepts, failing over host by host and then pool by pool.

use crate::error::{UpstreamError, UpstreamResult};
use crate::health::FailureRecord;
use crate::load_balancer::{Host, Pool};
use crate::net::Connector;
use crate::observability::metrics;
use crate::store::SharedStore;
use crate::upstream::{UnitOfWork, Upstream};

/// Host a connection was established to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub pool: String,
    pub host: Host,
}

enum PoolOutcome<T> {
    Connected(T, Selected),
    /// Every live host failed; carries the last error, if any attempt was made.
    Exhausted(Option<UpstreamError>),
}

impl<S: SharedStore, C: Connector> Upstream<S, C> {
    /// Connect to a live host using the instance's connector.
    pub async fn connect(&self, ctx: &mut UnitOfWork) -> UpstreamResult<(C::Conn, Selected)> {
        self.connect_using(ctx, &*self.connector).await
    }

    /// Connect to a live host using a caller-supplied connector.
    pub async fn connect_using<K: Connector>(
        &self,
        ctx: &mut UnitOfWork,
        connector: &K,
    ) -> UpstreamResult<(K::Conn, Selected)> {
        let pools = self.registry.get_pools(ctx)?;
        let order = self.registry.get_priority_index(ctx)?;

        let mut last_error = None;
        for pool_id in order.iter() {
            let Some(pool) = pools.get(pool_id) else {
                tracing::warn!(upstream = %self.id(), pool = %pool_id, "Priority index names unknown pool");
                continue;
            };
            if !pool.up {
                tracing::debug!(upstream = %self.id(), pool = %pool_id, "Skipping pool marked down");
                continue;
            }

            match connect_pool(pool, ctx.failures_mut(), connector).await {
                PoolOutcome::Connected(conn, selected) => return Ok((conn, selected)),
                PoolOutcome::Exhausted(Some(e)) => last_error = Some(e),
                PoolOutcome::Exhausted(None) => {}
            }
            tracing::debug!(upstream = %self.id(), pool = %pool_id, "Pool exhausted, failing over");
        }

        Err(last_error.unwrap_or(UpstreamError::NoLiveHosts))
    }
}

async fn connect_pool<K: Connector>(
    pool: &Pool,
    failures: &mut FailureRecord,
    connector: &K,
) -> PoolOutcome<K::Conn> {
    let mut excluded: Vec<bool> = pool
        .hosts
        .iter()
        .map(|h| !h.up || failures.contains(&pool.id, &h.id))
        .collect();
    let mut remaining = excluded.iter().filter(|e| !**e).count();
    let mut total_weight: u64 = pool
        .hosts
        .iter()
        .zip(&excluded)
        .filter(|(_, ex)| !**ex)
        .map(|(h, _)| u64::from(h.weight))
        .sum();

    let strategy = pool.method.strategy();
    let mut last_error = None;

    while remaining > 0 {
        let picked = if remaining == 1 {
            excluded.iter().position(|e| !*e)
        } else {
            strategy.select(&pool.hosts, &excluded, total_weight)
        };
        let Some(idx) = picked else { break };
        let host = &pool.hosts[idx];

        metrics::record_connect_attempt(&pool.id);
        match connector.connect(&host.host, host.port, pool.timeout()).await {
            Ok(conn) => {
                tracing::debug!(pool = %pool.id, host = %host.id, address = %host.address(), "Connected to upstream host");
                let selected = Selected {
                    pool: pool.id.clone(),
                    host: host.clone(),
                };
                return PoolOutcome::Connected(conn, selected);
            }
            Err(e) => {
                tracing::warn!(pool = %pool.id, host = %host.id, address = %host.address(), error = %e, "Upstream connect failed");
                metrics::record_connect_failure(&pool.id);
                failures.record(&pool.id, &host.id);
                excluded[idx] = true;
                remaining -= 1;
                total_weight = total_weight.saturating_sub(u64::from(host.weight));
                last_error = Some(UpstreamError::Connection {
                    pool: pool.id.clone(),
                    host: host.id.clone(),
                    source: e,
                });
            }
        }
    }

    PoolOutcome::Exhausted(last_error)
}
