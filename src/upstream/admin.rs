//! Administrative mutation of the pool table.
//!
//! Every operation follows the same discipline: lock, read the latest table,
//! mutate, persist the table and its priority index, unlock. The caller's unit
//! of work is refreshed with the written state.

use std::sync::Arc;

use crate::config::validation::{validate_host, validate_pool, ValidationError};
use crate::error::{UpstreamError, UpstreamResult};
use crate::load_balancer::{Host, Method, Pool, PoolTable};
use crate::net::Connector;
use crate::store::SharedStore;
use crate::upstream::{UnitOfWork, Upstream};

fn rejected(errors: Vec<ValidationError>) -> UpstreamResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
    Err(UpstreamError::Config(joined.join(", ")))
}

fn pool_mut<'a>(pools: &'a mut PoolTable, pool_id: &str) -> UpstreamResult<&'a mut Pool> {
    pools
        .get_mut(pool_id)
        .ok_or_else(|| UpstreamError::NotFound(format!("pool {pool_id}")))
}

fn host_mut<'a>(pools: &'a mut PoolTable, pool_id: &str, host_id: &str) -> UpstreamResult<&'a mut Host> {
    pool_mut(pools, pool_id)?
        .host_mut(host_id)
        .ok_or_else(|| UpstreamError::NotFound(format!("host {host_id} in pool {pool_id}")))
}

impl<S: SharedStore, C: Connector> Upstream<S, C> {
    async fn mutate_pools<T>(
        &self,
        ctx: &mut UnitOfWork,
        operation: &'static str,
        f: impl FnOnce(&mut PoolTable) -> UpstreamResult<T>,
    ) -> UpstreamResult<T> {
        let mut locked = self.registry.get_locked_pools().await?;
        let out = f(&mut locked.pools)?;
        self.registry.save_pools(&locked.pools)?;
        let index = self.registry.sort_pools(&locked.pools)?;
        let pools = locked.unlock()?;
        tracing::info!(upstream = %self.id(), operation, pools = pools.len(), "Pool table updated");
        ctx.cache(pools, Some(index));
        Ok(out)
    }

    /// Add a new pool.
    pub async fn create_pool(&self, ctx: &mut UnitOfWork, pool: Pool) -> UpstreamResult<()> {
        rejected(validate_pool(&pool))?;
        self.mutate_pools(ctx, "create_pool", |pools| {
            if pools.contains(&pool.id) {
                return Err(UpstreamError::Config(format!("pool {} already exists", pool.id)));
            }
            pools.insert(pool);
            Ok(())
        })
        .await
    }

    /// Insert every seed pool that does not exist yet. Returns how many were added.
    pub async fn seed_pools(&self, ctx: &mut UnitOfWork, seeds: Vec<Pool>) -> UpstreamResult<usize> {
        for pool in &seeds {
            rejected(validate_pool(pool))?;
        }
        self.mutate_pools(ctx, "seed_pools", |pools| {
            let mut added = 0;
            for pool in seeds {
                if !pools.contains(&pool.id) {
                    pools.insert(pool);
                    added += 1;
                }
            }
            Ok(added)
        })
        .await
    }

    pub async fn remove_pool(&self, ctx: &mut UnitOfWork, pool_id: &str) -> UpstreamResult<Pool> {
        self.mutate_pools(ctx, "remove_pool", |pools| {
            pools
                .remove(pool_id)
                .ok_or_else(|| UpstreamError::NotFound(format!("pool {pool_id}")))
        })
        .await
    }

    /// Change a pool's priority; the failover order is recomputed.
    pub async fn set_priority(&self, ctx: &mut UnitOfWork, pool_id: &str, priority: i64) -> UpstreamResult<()> {
        self.mutate_pools(ctx, "set_priority", |pools| {
            pool_mut(pools, pool_id)?.priority = priority;
            Ok(())
        })
        .await
    }

    pub async fn set_method(&self, ctx: &mut UnitOfWork, pool_id: &str, method: Method) -> UpstreamResult<()> {
        self.mutate_pools(ctx, "set_method", |pools| {
            pool_mut(pools, pool_id)?.method = method;
            Ok(())
        })
        .await
    }

    /// Flip the pool-level switch without touching host health.
    pub async fn set_pool_up(&self, ctx: &mut UnitOfWork, pool_id: &str, up: bool) -> UpstreamResult<()> {
        self.mutate_pools(ctx, "set_pool_up", |pools| {
            pool_mut(pools, pool_id)?.up = up;
            Ok(())
        })
        .await
    }

    pub async fn add_host(&self, ctx: &mut UnitOfWork, pool_id: &str, host: Host) -> UpstreamResult<()> {
        rejected(validate_host(pool_id, &host))?;
        self.mutate_pools(ctx, "add_host", |pools| {
            let pool = pool_mut(pools, pool_id)?;
            if pool.host(&host.id).is_some() {
                return Err(UpstreamError::Config(format!(
                    "host {} already exists in pool {pool_id}",
                    host.id
                )));
            }
            pool.hosts.push(host);
            Ok(())
        })
        .await
    }

    pub async fn remove_host(&self, ctx: &mut UnitOfWork, pool_id: &str, host_id: &str) -> UpstreamResult<Host> {
        self.mutate_pools(ctx, "remove_host", |pools| {
            let pool = pool_mut(pools, pool_id)?;
            let idx = pool
                .hosts
                .iter()
                .position(|h| h.id == host_id)
                .ok_or_else(|| UpstreamError::NotFound(format!("host {host_id} in pool {pool_id}")))?;
            Ok(pool.hosts.remove(idx))
        })
        .await
    }

    pub async fn set_weight(&self, ctx: &mut UnitOfWork, pool_id: &str, host_id: &str, weight: u32) -> UpstreamResult<()> {
        if weight == 0 {
            return Err(UpstreamError::Config("weight must be positive".into()));
        }
        self.mutate_pools(ctx, "set_weight", |pools| {
            host_mut(pools, pool_id, host_id)?.weight = weight;
            Ok(())
        })
        .await
    }

    /// Take a host out by hand. With no `lastfail` the reconciler leaves it
    /// down until [`Upstream::up_host`] is called.
    pub async fn down_host(&self, ctx: &mut UnitOfWork, pool_id: &str, host_id: &str) -> UpstreamResult<()> {
        self.mutate_pools(ctx, "down_host", |pools| {
            let host = host_mut(pools, pool_id, host_id)?;
            host.up = false;
            host.lastfail = 0;
            Ok(())
        })
        .await
    }

    /// Bring a host back and clear its failure history.
    pub async fn up_host(&self, ctx: &mut UnitOfWork, pool_id: &str, host_id: &str) -> UpstreamResult<()> {
        self.mutate_pools(ctx, "up_host", |pools| {
            let host = host_mut(pools, pool_id, host_id)?;
            host.up = true;
            host.failcount = 0;
            host.lastfail = 0;
            Ok(())
        })
        .await
    }

    /// Pool table as seen by this unit of work.
    pub fn status(&self, ctx: &mut UnitOfWork) -> UpstreamResult<Arc<PoolTable>> {
        self.registry.get_pools(ctx)
    }
}
