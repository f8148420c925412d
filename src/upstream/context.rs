//! Unit-of-work context.
//!
//! One `UnitOfWork` spans one request or one background pass. It caches the
//! pool table and priority index read from the store and accumulates the
//! hosts that failed, so neither needs a lock or any ambient lookup.

use std::sync::Arc;

use crate::health::passive::FailureRecord;
use crate::load_balancer::{PoolTable, PriorityIndex};

/// Explicit per-request state passed into every upstream operation.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    pub(crate) pools: Option<Arc<PoolTable>>,
    pub(crate) priority: Option<Arc<PriorityIndex>>,
    failures: FailureRecord,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts that failed during this unit of work.
    pub fn failures(&self) -> &FailureRecord {
        &self.failures
    }

    pub(crate) fn failures_mut(&mut self) -> &mut FailureRecord {
        &mut self.failures
    }

    /// Replace both cached records, e.g. after an administrative write.
    pub(crate) fn cache(&mut self, pools: PoolTable, priority: Option<PriorityIndex>) {
        self.pools = Some(Arc::new(pools));
        if let Some(priority) = priority {
            self.priority = Some(Arc::new(priority));
        }
    }

    /// Drop cached records so the next read goes to the store.
    pub fn invalidate(&mut self) {
        self.pools = None;
        self.priority = None;
    }

    pub fn into_failures(self) -> FailureRecord {
        self.failures
    }
}
