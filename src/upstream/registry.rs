//! Pool registry.
//!
//! # Responsibilities
//! - Own the store keys of one upstream instance
//! - Serve lock-free, unit-of-work cached reads for the request path
//! - Serve locked, uncached snapshots for mutations
//! - Persist the pool table and the derived priority index
//!
//! # Design Decisions
//! - Absent or undecodable records are `BrokenState`, never a panic
//! - A locked snapshot owns its `LockGuard`; dropping it unlocks

use std::sync::Arc;

use crate::error::{UpstreamError, UpstreamResult};
use crate::load_balancer::{PoolTable, PriorityIndex};
use crate::store::{self, LockGuard, SharedStore};
use crate::upstream::context::UnitOfWork;

#[derive(Debug)]
struct Keys {
    id: String,
    pools: String,
    priority: String,
    lock: String,
    leader: String,
}

impl Keys {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            pools: format!("{id}_pools"),
            priority: format!("{id}_priority_index"),
            lock: format!("{id}_lock"),
            leader: format!("{id}_background_worker"),
        }
    }
}

/// Store-backed pool table of one upstream instance.
#[derive(Debug)]
pub struct PoolRegistry<S> {
    store: Arc<S>,
    keys: Arc<Keys>,
}

impl<S> Clone for PoolRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: Arc::clone(&self.keys),
        }
    }
}

/// Pool table read under the instance lock.
#[derive(Debug)]
pub struct LockedPools<S: SharedStore> {
    pub pools: PoolTable,
    guard: LockGuard<S>,
}

impl<S: SharedStore> LockedPools<S> {
    /// Release the instance lock, handing back the (possibly mutated) table.
    pub fn unlock(self) -> UpstreamResult<PoolTable> {
        let Self { pools, guard } = self;
        guard.release().map_err(UpstreamError::Lock)?;
        Ok(pools)
    }
}

impl<S: SharedStore> PoolRegistry<S> {
    /// Open the registry for `id`, creating an empty pool table on first use.
    ///
    /// Returns `false` as the second element when the instance has no pools
    /// yet and the caller must seed it.
    pub fn open(store: Arc<S>, id: &str) -> UpstreamResult<(Self, bool)> {
        if id.trim().is_empty() {
            return Err(UpstreamError::Config("upstream id must not be empty".into()));
        }
        let registry = Self {
            store,
            keys: Arc::new(Keys::new(id)),
        };

        let empty = encode(PoolTable::new().encode())?;
        let created = registry
            .store
            .add(&registry.keys.pools, empty)
            .map_err(|e| UpstreamError::Config(format!("shared store unavailable: {e}")))?;
        if created {
            let index = encode(PriorityIndex::default().encode())?;
            registry
                .store
                .add(&registry.keys.priority, index)
                .map_err(|e| UpstreamError::Config(format!("shared store unavailable: {e}")))?;
            tracing::info!(upstream = %id, "Initialized empty pool table");
            return Ok((registry, false));
        }

        let configured = !registry.load_pools()?.is_empty();
        Ok((registry, configured))
    }

    pub fn id(&self) -> &str {
        &self.keys.id
    }

    pub fn lock_key(&self) -> &str {
        &self.keys.lock
    }

    pub(crate) fn leader_key(&self) -> &str {
        &self.keys.leader
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Pool table for this unit of work, read from the store on first access.
    pub fn get_pools(&self, ctx: &mut UnitOfWork) -> UpstreamResult<Arc<PoolTable>> {
        if let Some(pools) = &ctx.pools {
            return Ok(Arc::clone(pools));
        }
        let pools = Arc::new(self.load_pools()?);
        ctx.pools = Some(Arc::clone(&pools));
        Ok(pools)
    }

    /// Priority index for this unit of work, read from the store on first access.
    pub fn get_priority_index(&self, ctx: &mut UnitOfWork) -> UpstreamResult<Arc<PriorityIndex>> {
        if let Some(priority) = &ctx.priority {
            return Ok(Arc::clone(priority));
        }
        let bytes = self
            .store
            .get(&self.keys.priority)
            .map_err(|e| UpstreamError::BrokenState(format!("priority index unreadable: {e}")))?
            .ok_or_else(|| UpstreamError::BrokenState("priority index missing".into()))?;
        let priority = PriorityIndex::decode(&bytes)
            .map_err(|e| UpstreamError::BrokenState(format!("priority index corrupt: {e}")))?;
        let priority = Arc::new(priority);
        ctx.priority = Some(Arc::clone(&priority));
        Ok(priority)
    }

    /// Take the instance lock and read the latest pool table, bypassing any cache.
    pub async fn get_locked_pools(&self) -> UpstreamResult<LockedPools<S>> {
        let guard = store::acquire(&self.store, &self.keys.lock)
            .await
            .map_err(UpstreamError::Lock)?;
        let pools = self.load_pools()?;
        Ok(LockedPools { pools, guard })
    }

    /// Persist the full pool table.
    pub fn save_pools(&self, pools: &PoolTable) -> UpstreamResult<()> {
        let bytes = encode(pools.encode())?;
        self.store
            .set(&self.keys.pools, bytes)
            .map_err(UpstreamError::Persist)
    }

    /// Recompute the priority index from `pools` and persist it.
    pub fn sort_pools(&self, pools: &PoolTable) -> UpstreamResult<PriorityIndex> {
        let index = PriorityIndex::from_pools(pools);
        let bytes = encode(index.encode())?;
        self.store
            .set(&self.keys.priority, bytes)
            .map_err(UpstreamError::Persist)?;
        tracing::debug!(upstream = %self.keys.id, pools = index.len(), "Priority index updated");
        Ok(index)
    }

    fn load_pools(&self) -> UpstreamResult<PoolTable> {
        let bytes = self
            .store
            .get(&self.keys.pools)
            .map_err(|e| UpstreamError::BrokenState(format!("pool table unreadable: {e}")))?
            .ok_or_else(|| UpstreamError::BrokenState("pool table missing".into()))?;
        PoolTable::decode(&bytes)
            .map_err(|e| UpstreamError::BrokenState(format!("pool table corrupt: {e}")))
    }
}

fn encode(result: Result<Vec<u8>, serde_json::Error>) -> UpstreamResult<Vec<u8>> {
    result.map_err(|e| UpstreamError::BrokenState(format!("encoding failed: {e}")))
}
