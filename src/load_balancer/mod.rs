//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher picks the next pool in priority order
//!     → pool.rs (pool thresholds + hosts)
//!     → live hosts: up and not failed in this unit of work
//!     → Pool::method resolves to a SelectionStrategy:
//!         - weighted.rs (weighted random draw)
//!     → backend.rs (chosen host to connect to)
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless; exclusion and total weight are owned by the
//!   dispatcher so a retry never rebuilds the live set
//! - Strategies are a closed set keyed by the persisted method name
//! - Adding a strategy never touches the pool iteration logic

pub mod backend;
pub mod pool;
pub mod weighted;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use backend::Host;
pub use pool::{Pool, PoolTable, PriorityIndex};
pub use weighted::WeightedRandom;

/// Host selection over a pool's hosts.
pub trait SelectionStrategy: Send + Sync {
    /// Persisted method name.
    fn name(&self) -> &'static str;

    /// Pick the index of a host that is not `excluded`.
    ///
    /// `excluded` is parallel to `hosts`; `total_weight` is the summed weight
    /// of the hosts that are not excluded.
    fn select(&self, hosts: &[Host], excluded: &[bool], total_weight: u64) -> Option<usize>;
}

/// Selection method identifier stored on each pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    WeightedRandom,
}

impl Method {
    /// Strategy implementing this method.
    pub fn strategy(self) -> &'static dyn SelectionStrategy {
        match self {
            Method::WeightedRandom => &WeightedRandom,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.strategy().name()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted_random" => Ok(Method::WeightedRandom),
            other => Err(format!("unknown selection method: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!("weighted_random".parse::<Method>(), Ok(Method::WeightedRandom));
        assert!("round_robin".parse::<Method>().is_err());
        assert!("least_conn".parse::<Method>().is_err());
        assert_eq!(Method::WeightedRandom.to_string(), "weighted_random");
    }

    #[test]
    fn test_method_serde() {
        assert!(serde_json::from_str::<Method>("\"round_robin\"").is_err());
        let m: Method = serde_json::from_str("\"weighted_random\"").unwrap();
        assert_eq!(m, Method::WeightedRandom);
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"weighted_random\"");
        assert!(serde_json::from_str::<Method>("\"random\"").is_err());
    }
}
