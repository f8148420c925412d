//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Collect connection failures during a unit of work without locking
//! - Commit them into the shared pool table after the unit of work ends
//! - Flip hosts down once the pool's `max_fails` is reached
//!
//! # Design Decisions
//! - Connect errors and connect timeouts count as failures alike
//! - A host is recorded at most once per unit of work
//! - Concurrent commits from other workers are serialized by the instance
//!   lock; each commit reads the latest table before applying its record

use std::collections::{BTreeMap, BTreeSet};

use crate::error::UpstreamResult;
use crate::health::state;
use crate::observability::metrics;
use crate::store::SharedStore;
use crate::upstream::registry::PoolRegistry;

/// Hosts that failed during one unit of work, grouped by pool id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRecord {
    failed: BTreeMap<String, BTreeSet<String>>,
}

impl FailureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `host` of `pool` as failed. Returns `false` if it was already marked.
    pub fn record(&mut self, pool: &str, host: &str) -> bool {
        self.failed
            .entry(pool.to_string())
            .or_default()
            .insert(host.to_string())
    }

    pub fn contains(&self, pool: &str, host: &str) -> bool {
        self.failed
            .get(pool)
            .map(|hosts| hosts.contains(host))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of failed `(pool, host)` pairs.
    pub fn len(&self) -> usize {
        self.failed.values().map(BTreeSet::len).sum()
    }

    /// Failed hosts of one pool.
    pub fn hosts(&self, pool: &str) -> impl Iterator<Item = &str> {
        self.failed
            .get(pool)
            .into_iter()
            .flat_map(|hosts| hosts.iter().map(String::as_str))
    }

    /// All failed `(pool, host)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed
            .iter()
            .flat_map(|(pool, hosts)| hosts.iter().map(move |h| (pool.as_str(), h.as_str())))
    }
}

/// Outcome of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Failures applied to hosts that still exist.
    pub applied: usize,
    /// `(pool, host)` pairs flipped down by this commit.
    pub marked_down: Vec<(String, String)>,
    /// Failures whose pool or host no longer exists.
    pub skipped: usize,
}

/// Merge `record` into the shared pool table at time `now`.
pub async fn commit_failures<S: SharedStore>(
    registry: &PoolRegistry<S>,
    record: &FailureRecord,
    now: u64,
) -> UpstreamResult<CommitReport> {
    let mut report = CommitReport::default();
    if record.is_empty() {
        return Ok(report);
    }

    let mut locked = registry.get_locked_pools().await?;
    for (pool_id, host_id) in record.iter() {
        let Some(pool) = locked.pools.get_mut(pool_id) else {
            tracing::warn!(upstream = %registry.id(), pool = %pool_id, "Failed pool no longer exists");
            report.skipped += 1;
            continue;
        };
        let max_fails = pool.max_fails;
        let Some(host) = pool.host_mut(host_id) else {
            tracing::warn!(upstream = %registry.id(), pool = %pool_id, host = %host_id, "Failed host no longer exists");
            report.skipped += 1;
            continue;
        };

        report.applied += 1;
        if state::record_failure(host, max_fails, now) {
            tracing::warn!(
                upstream = %registry.id(),
                pool = %pool_id,
                host = %host_id,
                failcount = host.failcount,
                "Host marked down"
            );
            metrics::record_host_down(pool_id);
            report.marked_down.push((pool_id.to_string(), host_id.to_string()));
        } else {
            tracing::debug!(
                upstream = %registry.id(),
                pool = %pool_id,
                host = %host_id,
                failcount = host.failcount,
                "Host failure committed"
            );
        }
    }

    if report.applied > 0 {
        registry.save_pools(&locked.pools)?;
    }
    locked.unlock()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::load_balancer::{Host, Pool, PoolTable};
    use crate::store::MemoryStore;
    use crate::upstream::context::UnitOfWork;

    fn registry_with(table: PoolTable) -> (Arc<MemoryStore>, PoolRegistry<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (registry, _) = PoolRegistry::open(store.clone(), "api").unwrap();
        registry.save_pools(&table).unwrap();
        registry.sort_pools(&table).unwrap();
        (store, registry)
    }

    fn fresh_pools(registry: &PoolRegistry<MemoryStore>) -> Arc<PoolTable> {
        registry.get_pools(&mut UnitOfWork::new()).unwrap()
    }

    #[test]
    fn test_record_is_a_set() {
        let mut record = FailureRecord::new();
        assert!(record.record("primary", "web1"));
        assert!(!record.record("primary", "web1"));
        assert!(record.record("primary", "web2"));
        assert!(record.record("backup", "dr1"));

        assert_eq!(record.len(), 3);
        assert!(record.contains("primary", "web2"));
        assert!(!record.contains("backup", "web2"));
        assert_eq!(record.hosts("primary").collect::<Vec<_>>(), vec!["web1", "web2"]);
        assert_eq!(record.hosts("missing").count(), 0);
    }

    #[tokio::test]
    async fn test_commit_crosses_threshold() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        host.failcount = 2;
        host.lastfail = 500;
        let table: PoolTable = vec![Pool::new("primary").with_host(host)].into_iter().collect();
        let (store, registry) = registry_with(table);

        let mut record = FailureRecord::new();
        record.record("primary", "web1");
        let report = commit_failures(&registry, &record, 1000).await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.marked_down, vec![("primary".to_string(), "web1".to_string())]);
        let pools = fresh_pools(&registry);
        let host = pools.get("primary").unwrap().host("web1").unwrap();
        assert!(!host.up);
        assert_eq!(host.failcount, 3);
        assert_eq!(host.lastfail, 1000);
        assert!(!store.is_locked(registry.lock_key()));
    }

    #[tokio::test]
    async fn test_commit_skips_removed_hosts() {
        let table: PoolTable = vec![Pool::new("primary").with_host(Host::new("web1", "10.0.0.1", 80, 1))]
            .into_iter()
            .collect();
        let (_, registry) = registry_with(table);

        let mut record = FailureRecord::new();
        record.record("primary", "web1");
        record.record("primary", "gone");
        record.record("deleted", "web9");
        let report = commit_failures(&registry, &record, 42).await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 2);
        let pools = fresh_pools(&registry);
        let host = pools.get("primary").unwrap().host("web1").unwrap();
        assert!(host.up);
        assert_eq!(host.failcount, 1);
        assert_eq!(host.lastfail, 42);
    }

    #[tokio::test]
    async fn test_empty_record_takes_no_lock() {
        let (store, registry) = registry_with(PoolTable::new());
        store.lock(registry.lock_key()).await.unwrap();
        // Would time out if it tried to lock.
        let report = commit_failures(&registry, &FailureRecord::new(), 1).await.unwrap();
        assert_eq!(report, CommitReport::default());
    }

    #[tokio::test]
    async fn test_concurrent_commits_all_apply() {
        let table: PoolTable = vec![Pool::new("primary").with_host(Host::new("web1", "10.0.0.1", 80, 1))]
            .into_iter()
            .collect();
        let (_, registry) = registry_with(table);

        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut record = FailureRecord::new();
                record.record("primary", "web1");
                commit_failures(&registry, &record, 100 + i).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let pools = fresh_pools(&registry);
        let host = pools.get("primary").unwrap().host("web1").unwrap();
        assert_eq!(host.failcount, 8);
        assert!(!host.up);
    }
}
