//! Shared state store subsystem.
//!
//! # Data Flow
//! ```text
//! Pool registry / leader election
//!     → SharedStore::get / set / add   (cross-worker visible records)
//!     → SharedStore::lock → LockToken → LockGuard  (instance-scoped mutual exclusion)
//!     → LockGuard::release or drop                 (unlock on every exit path)
//! ```
//!
//! # Design Decisions
//! - The store is injected as `Arc<S>`; every worker of the process group
//!   shares the same handle
//! - Lock acquisition has a bounded wait owned by the store, callers treat a
//!   timeout as a soft failure
//! - Lock entries expire so a holder that died mid-update cannot wedge the
//!   instance for every other worker
//! - Every acquisition gets its own token; unlock only removes the entry the
//!   token names, so a holder whose lock expired and was taken over cannot
//!   release the new holder's lock

pub mod memory;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

pub use memory::{LockOptions, MemoryStore};

/// Errors raised by a shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The lock was still held by someone else when the bounded wait ran out.
    #[error("timed out after {waited:?} waiting for lock {key}")]
    LockTimeout { key: String, waited: Duration },

    /// Unlock was requested for a key that is not locked.
    #[error("lock {key} is not held")]
    NotLocked { key: String },

    /// The lock expired and is now held under another token.
    #[error("lock {key} was lost to another holder")]
    LockLost { key: String },
}

/// Proof of one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Key-value store visible to every worker, with named locks.
pub trait SharedStore: Send + Sync + 'static {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrite the value stored under `key`.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Store `value` only if `key` is absent. Returns whether it was written.
    fn add(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError>;

    /// Acquire the named lock, waiting at most the store's configured bound.
    fn lock(&self, key: &str) -> impl Future<Output = Result<LockToken, StoreError>> + Send;

    /// Release the named lock if it is still held under `token`.
    fn unlock(&self, key: &str, token: LockToken) -> Result<(), StoreError>;
}

/// Acquire `key` on `store` and return a guard that releases it.
pub async fn acquire<S: SharedStore>(store: &Arc<S>, key: &str) -> Result<LockGuard<S>, StoreError> {
    let token = store.lock(key).await?;
    Ok(LockGuard {
        store: Arc::clone(store),
        key: key.to_string(),
        token,
        held: true,
    })
}

/// Scoped ownership of a store lock.
///
/// Dropping the guard unlocks, including during unwinding, so a mutation that
/// fails or panics halfway never leaves the instance locked.
#[derive(Debug)]
pub struct LockGuard<S: SharedStore> {
    store: Arc<S>,
    key: String,
    token: LockToken,
    held: bool,
}

impl<S: SharedStore> LockGuard<S> {
    /// Key of the held lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock and report whether the store accepted the unlock.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.held = false;
        self.store.unlock(&self.key, self.token)
    }
}

impl<S: SharedStore> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.store.unlock(&self.key, self.token) {
                tracing::warn!(key = %self.key, error = %e, "Failed to release store lock");
            }
        }
    }
}
