//! Host record.
//!
//! # Responsibilities
//! - Represent a single backend endpoint inside a pool
//! - Carry the persisted health fields shared by every worker
//!
//! A seed only needs `id`, `host`, `port` and `weight`; the health fields
//! default to a healthy, never-failed host.

use serde::{Deserialize, Serialize};

/// A single backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Identifier, unique within the owning pool.
    pub id: String,
    /// Address to connect to.
    pub host: String,
    pub port: u16,
    /// Relative selection probability.
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_up")]
    pub up: bool,
    /// Failures committed since the host was last healthy.
    #[serde(default)]
    pub failcount: u32,
    /// Unix seconds of the last committed failure, 0 when never failed.
    #[serde(default)]
    pub lastfail: u64,
}

fn default_weight() -> u32 {
    1
}

fn default_up() -> bool {
    true
}

impl Host {
    /// Create a healthy host.
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, weight: u32) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            weight,
            up: true,
            failcount: 0,
            lastfail: 0,
        }
    }

    /// `host:port` for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Down with no recorded failure: taken out by an operator, not by the
    /// failure threshold.
    pub fn is_manually_down(&self) -> bool {
        !self.up && self.lastfail == 0
    }
}
