//! Leader election for the background reconciler.
//!
//! Exactly one worker per upstream instance reconciles. Every worker
//! registers itself at startup (last writer wins) and re-checks ownership on
//! each tick. The leader refreshes a heartbeat; a follower that sees the
//! heartbeat go stale takes over under the instance lock.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{UpstreamError, UpstreamResult};
use crate::store::{self, SharedStore};
use crate::upstream::registry::PoolRegistry;

/// Identity of one worker of the process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Generate a new random worker identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LeaderRecord {
    worker: WorkerId,
    heartbeat: u64,
}

/// Result of a leadership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leadership {
    Leader,
    Follower { leader: Option<WorkerId> },
}

impl Leadership {
    pub fn is_leader(&self) -> bool {
        matches!(self, Leadership::Leader)
    }
}

fn read_record<S: SharedStore>(registry: &PoolRegistry<S>) -> UpstreamResult<Option<LeaderRecord>> {
    let bytes = registry
        .store()
        .get(registry.leader_key())
        .map_err(UpstreamError::Persist)?;
    Ok(bytes.and_then(|b| match serde_json::from_slice(&b) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(upstream = %registry.id(), error = %e, "Discarding unreadable leader record");
            None
        }
    }))
}

fn write_record<S: SharedStore>(
    registry: &PoolRegistry<S>,
    worker: WorkerId,
    now: u64,
) -> UpstreamResult<()> {
    let record = LeaderRecord {
        worker,
        heartbeat: now,
    };
    let bytes = serde_json::to_vec(&record)
        .map_err(|e| UpstreamError::BrokenState(format!("encoding leader record: {e}")))?;
    registry
        .store()
        .set(registry.leader_key(), bytes)
        .map_err(UpstreamError::Persist)
}

/// Claim leadership at worker startup.
pub fn register<S: SharedStore>(
    registry: &PoolRegistry<S>,
    worker: WorkerId,
    now: u64,
) -> UpstreamResult<()> {
    write_record(registry, worker, now)?;
    tracing::info!(upstream = %registry.id(), worker = %worker, "Registered as background worker");
    Ok(())
}

/// Current leader, if any has registered.
pub fn current<S: SharedStore>(registry: &PoolRegistry<S>) -> UpstreamResult<Option<WorkerId>> {
    Ok(read_record(registry)?.map(|r| r.worker))
}

/// Check whether `worker` leads at `now`, taking over from a leader whose
/// heartbeat is older than `stale_after` seconds.
///
/// Heartbeat refreshes and takeovers both happen under the instance lock
/// after re-reading the record, so a refresh never overwrites a takeover.
pub async fn check<S: SharedStore>(
    registry: &PoolRegistry<S>,
    worker: WorkerId,
    now: u64,
    stale_after: u64,
) -> UpstreamResult<Leadership> {
    let fresh_other = |record: &LeaderRecord| {
        record.worker != worker && now.saturating_sub(record.heartbeat) < stale_after
    };

    // Followers of a live leader never touch the lock.
    if let Some(record) = read_record(registry)?.filter(|r| fresh_other(r)) {
        return Ok(Leadership::Follower {
            leader: Some(record.worker),
        });
    }

    let guard = store::acquire(registry.store(), registry.lock_key())
        .await
        .map_err(UpstreamError::Lock)?;
    let leadership = match read_record(registry)? {
        Some(record) if fresh_other(&record) => Leadership::Follower {
            leader: Some(record.worker),
        },
        Some(record) if record.worker == worker => {
            write_record(registry, worker, now)?;
            Leadership::Leader
        }
        previous => {
            write_record(registry, worker, now)?;
            tracing::warn!(
                upstream = %registry.id(),
                worker = %worker,
                previous = ?previous.map(|r| r.worker),
                "Took over background leadership"
            );
            Leadership::Leader
        }
    };
    guard.release().map_err(UpstreamError::Lock)?;
    Ok(leadership)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::MemoryStore;

    fn registry() -> PoolRegistry<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        PoolRegistry::open(store, "api").unwrap().0
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = registry();
        let first = WorkerId::new();
        let second = WorkerId::new();

        register(&registry, first, 100).unwrap();
        register(&registry, second, 101).unwrap();
        assert_eq!(current(&registry).unwrap(), Some(second));

        assert_eq!(check(&registry, second, 110, 180).await.unwrap(), Leadership::Leader);
        assert_eq!(
            check(&registry, first, 110, 180).await.unwrap(),
            Leadership::Follower { leader: Some(second) }
        );
    }

    #[tokio::test]
    async fn test_leader_heartbeat_keeps_followers_out() {
        let registry = registry();
        let leader = WorkerId::new();
        let follower = WorkerId::new();
        register(&registry, leader, 0).unwrap();

        // The leader keeps refreshing, so the follower never sees a stale record.
        for now in (60..=600).step_by(60) {
            assert!(check(&registry, leader, now, 180).await.unwrap().is_leader());
            assert!(!check(&registry, follower, now, 180).await.unwrap().is_leader());
        }
    }

    #[tokio::test]
    async fn test_stale_leader_is_replaced() {
        let registry = registry();
        let dead = WorkerId::new();
        let survivor = WorkerId::new();
        register(&registry, dead, 0).unwrap();

        assert!(!check(&registry, survivor, 179, 180).await.unwrap().is_leader());
        assert!(check(&registry, survivor, 180, 180).await.unwrap().is_leader());
        assert_eq!(current(&registry).unwrap(), Some(survivor));
        assert!(!check(&registry, dead, 181, 180).await.unwrap().is_leader());
    }

    #[tokio::test]
    async fn test_missing_record_is_claimed() {
        let registry = registry();
        let worker = WorkerId::new();
        assert_eq!(current(&registry).unwrap(), None);
        assert!(check(&registry, worker, 5, 180).await.unwrap().is_leader());
        assert_eq!(current(&registry).unwrap(), Some(worker));
    }

    #[test]
    fn test_worker_id_display() {
        let id = WorkerId::new();
        assert!(id.to_string().starts_with("worker-"));
        assert_ne!(id, WorkerId::new());
    }

    #[tokio::test]
    async fn test_stale_leader_refresh_does_not_undo_takeover() {
        let registry = registry();
        let old = WorkerId::new();
        let new = WorkerId::new();
        register(&registry, old, 0).unwrap();

        assert!(check(&registry, new, 200, 180).await.unwrap().is_leader());
        // The old leader wakes up late: it must see the takeover, not refresh over it.
        assert_eq!(
            check(&registry, old, 200, 180).await.unwrap(),
            Leadership::Follower { leader: Some(new) }
        );
        assert_eq!(current(&registry).unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_leader_refresh_waits_for_lock() {
        let store = Arc::new(MemoryStore::with_lock_options(crate::store::LockOptions {
            timeout: std::time::Duration::from_millis(20),
            expiry: std::time::Duration::from_secs(30),
        }));
        let (registry, _) = PoolRegistry::open(store.clone(), "api").unwrap();
        let worker = WorkerId::new();
        register(&registry, worker, 0).unwrap();

        let _held = store::acquire(&store, registry.lock_key()).await.unwrap();
        let err = check(&registry, worker, 10, 180).await.unwrap_err();
        assert!(err.is_soft());
    }
}
