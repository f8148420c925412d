//! Pools, the pool table and the priority index.
//!
//! # Responsibilities
//! - Group interchangeable hosts that share thresholds and a strategy
//! - Encode/decode the table exactly as it is persisted in the shared store
//! - Derive the failover order from pool priorities

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::{backend::Host, Method};

/// A prioritized group of hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Identifier, unique within an upstream instance.
    pub id: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i64,
    /// Pool-level kill switch, independent of host state.
    #[serde(default = "default_up")]
    pub up: bool,
    /// Connect timeout for every host in the pool, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Seconds a failed host stays down before the reconciler revives it.
    #[serde(default = "default_failed_timeout")]
    pub failed_timeout: u64,
    /// Committed failures before a host is marked down.
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

fn default_up() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_failed_timeout() -> u64 {
    60
}

fn default_max_fails() -> u32 {
    3
}

impl Pool {
    /// Create an empty pool with default thresholds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            up: true,
            timeout_ms: default_timeout_ms(),
            failed_timeout: default_failed_timeout(),
            max_fails: default_max_fails(),
            method: Method::default(),
            hosts: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_host(mut self, host: Host) -> Self {
        self.hosts.push(host);
        self
    }

    /// Connect timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn host_mut(&mut self, id: &str) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|h| h.id == id)
    }
}

/// All pools of an upstream instance, keyed by pool id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolTable(BTreeMap<String, Pool>);

impl PoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Pool> {
        self.0.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Pool> {
        self.0.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Insert or replace a pool, returning the previous one.
    pub fn insert(&mut self, pool: Pool) -> Option<Pool> {
        self.0.insert(pool.id.clone(), pool)
    }

    pub fn remove(&mut self, id: &str) -> Option<Pool> {
        self.0.remove(id)
    }

    /// Pools in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pool> {
        self.0.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pool> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize for the shared store.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the shared store.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl FromIterator<Pool> for PoolTable {
    fn from_iter<I: IntoIterator<Item = Pool>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| (p.id.clone(), p)).collect())
    }
}

/// Pool ids in failover order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityIndex(Vec<String>);

impl PriorityIndex {
    /// Order pools by ascending priority.
    ///
    /// The sort is stable over the table's id order, so pools sharing a
    /// priority are ordered by id.
    pub fn from_pools(pools: &PoolTable) -> Self {
        let mut ordered: Vec<&Pool> = pools.iter().collect();
        ordered.sort_by_key(|p| p.priority);
        Self(ordered.into_iter().map(|p| p.id.clone()).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
