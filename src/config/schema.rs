//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Pool;
use crate::store::LockOptions;
use crate::upstream::UpstreamSettings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream instance identity and background timing.
    pub upstream: InstanceConfig,

    /// Shared store and lock tuning.
    pub store: StoreConfig,

    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Pools written to the store on first start. Ignored once the instance
    /// already has pools.
    pub pools: Vec<Pool>,
}

/// Upstream instance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instance identifier; namespaces every store key.
    pub id: String,

    /// Seconds between background ticks.
    pub reconcile_interval_secs: u64,

    /// Heartbeat age in seconds after which a follower takes leadership.
    pub leader_stale_after_secs: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            reconcile_interval_secs: 60,
            leader_stale_after_secs: 180,
        }
    }
}

impl InstanceConfig {
    pub fn settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            leader_stale_after: Duration::from_secs(self.leader_stale_after_secs),
        }
    }
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Longest wait for the instance lock, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Seconds after which a held lock is considered abandoned.
    pub lock_expiry_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            lock_expiry_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            expiry: Duration::from_secs(self.lock_expiry_secs),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Worker tasks sharing the listener.
    pub workers: usize,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            workers: 4,
            max_connections: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
