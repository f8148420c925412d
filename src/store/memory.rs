//! In-process shared store.
//!
//! Workers run as tasks of one process and share a single `Arc<MemoryStore>`,
//! so a concurrent map gives every worker the same view.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::time::Instant;

use crate::store::{LockToken, SharedStore, StoreError};

/// Lock timing for [`MemoryStore`].
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Longest time `lock` waits for a held lock.
    pub timeout: Duration,
    /// Lifetime of an acquired lock if its holder never releases it.
    pub expiry: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            expiry: Duration::from_secs(30),
        }
    }
}

/// Concurrent map store with expiring named locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Vec<u8>>,
    /// Lock key -> holder token and expiry deadline.
    locks: DashMap<String, (LockToken, Instant)>,
    options: LockOptions,
}

impl MemoryStore {
    /// Create an empty store with default lock timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given lock timing.
    pub fn with_lock_options(options: LockOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Whether `key` is currently locked (and not expired).
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .map(|entry| entry.1 > Instant::now())
            .unwrap_or(false)
    }

    fn try_acquire(&self, key: &str) -> Option<LockToken> {
        let now = Instant::now();
        let held = (LockToken::new(), now + self.options.expiry);
        match self.locks.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(held);
                Some(held.0)
            }
            Entry::Occupied(mut slot) => {
                let (previous, deadline) = *slot.get();
                if deadline <= now {
                    tracing::warn!(key = %key, previous = %previous, "Taking over expired store lock");
                    slot.insert(held);
                    Some(held.0)
                } else {
                    None
                }
            }
        }
    }
}

/// Delay before the next acquisition attempt: doubles from 1ms up to 500ms,
/// plus up to 10% jitter so waiting workers do not retry in lockstep.
fn lock_backoff(attempt: u32) -> Duration {
    const BASE_MS: u64 = 1;
    const MAX_MS: u64 = 500;

    let exponential = 2u64.saturating_pow(attempt.saturating_sub(1));
    let capped = BASE_MS.saturating_mul(exponential).min(MAX_MS);
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn add(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        match self.values.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn lock(&self, key: &str) -> Result<LockToken, StoreError> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if let Some(token) = self.try_acquire(key) {
                return Ok(token);
            }
            let waited = started.elapsed();
            if waited >= self.options.timeout {
                return Err(StoreError::LockTimeout {
                    key: key.to_string(),
                    waited,
                });
            }
            attempt += 1;
            let delay = lock_backoff(attempt).min(self.options.timeout - waited);
            tokio::time::sleep(delay).await;
        }
    }

    fn unlock(&self, key: &str, token: LockToken) -> Result<(), StoreError> {
        if self.locks.remove_if(key, |_, (holder, _)| *holder == token).is_some() {
            return Ok(());
        }
        if self.locks.contains_key(key) {
            Err(StoreError::LockLost { key: key.to_string() })
        } else {
            Err(StoreError::NotLocked { key: key.to_string() })
        }
    }
}
