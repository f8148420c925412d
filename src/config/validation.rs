//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate identifiers (non-empty, unique within their scope)
//! - Validate value ranges (weights > 0, ports valid, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: UpstreamConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, and again on every
//!   admin mutation that introduces pools or hosts

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::UpstreamConfig;
use crate::load_balancer::{Host, Pool};

/// A single semantic problem, located by a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a host as it would be added to `pool_id`.
pub fn validate_host(pool_id: &str, host: &Host) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let path = format!("pools.{pool_id}.hosts.{}", host.id);
    if host.id.is_empty() {
        errors.push(ValidationError::new(format!("pools.{pool_id}.hosts"), "host id must not be empty"));
    }
    if host.host.is_empty() {
        errors.push(ValidationError::new(format!("{path}.host"), "address must not be empty"));
    }
    if host.port == 0 {
        errors.push(ValidationError::new(format!("{path}.port"), "port must be non-zero"));
    }
    if host.weight == 0 {
        errors.push(ValidationError::new(format!("{path}.weight"), "weight must be positive"));
    }
    errors
}

/// Check a pool and all of its hosts.
pub fn validate_pool(pool: &Pool) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if pool.id.is_empty() {
        errors.push(ValidationError::new("pools", "pool id must not be empty"));
    }
    if pool.max_fails == 0 {
        errors.push(ValidationError::new(format!("pools.{}.max_fails", pool.id), "must be positive"));
    }
    if pool.timeout_ms == 0 {
        errors.push(ValidationError::new(format!("pools.{}.timeout_ms", pool.id), "must be positive"));
    }

    let mut seen = HashSet::new();
    for host in &pool.hosts {
        errors.extend(validate_host(&pool.id, host));
        if !seen.insert(host.id.as_str()) {
            errors.push(ValidationError::new(
                format!("pools.{}.hosts.{}", pool.id, host.id),
                "duplicate host id",
            ));
        }
    }
    errors
}

/// Check a whole configuration, collecting every problem.
pub fn validate_config(config: &UpstreamConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.id.is_empty() {
        errors.push(ValidationError::new("upstream.id", "must not be empty"));
    }
    if config.upstream.reconcile_interval_secs == 0 {
        errors.push(ValidationError::new("upstream.reconcile_interval_secs", "must be positive"));
    }
    if config.upstream.leader_stale_after_secs <= config.upstream.reconcile_interval_secs {
        errors.push(ValidationError::new(
            "upstream.leader_stale_after_secs",
            "must exceed reconcile_interval_secs",
        ));
    }
    if config.store.lock_timeout_ms == 0 {
        errors.push(ValidationError::new("store.lock_timeout_ms", "must be positive"));
    }
    if config.store.lock_expiry_secs == 0 {
        errors.push(ValidationError::new("store.lock_expiry_secs", "must be positive"));
    }
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.workers == 0 {
        errors.push(ValidationError::new("listener.workers", "must be positive"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be positive"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    let mut seen = HashSet::new();
    for pool in &config.pools {
        errors.extend(validate_pool(pool));
        if !seen.insert(pool.id.as_str()) {
            errors.push(ValidationError::new(format!("pools.{}", pool.id), "duplicate pool id"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: &str, port: u16, weight: u32) -> Host {
        Host::new(id, "10.0.0.1", port, weight)
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&UpstreamConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_pool_errors() {
        let mut config = UpstreamConfig::default();
        config.pools = vec![
            Pool::new("primary")
                .with_host(host("web1", 0, 1))
                .with_host(host("web1", 80, 0)),
            Pool::new("primary"),
        ];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"pools.primary.hosts.web1.port"));
        assert!(fields.contains(&"pools.primary.hosts.web1.weight"));
        assert!(fields.contains(&"pools.primary.hosts.web1"));
        assert!(fields.contains(&"pools.primary"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_rejects_bad_instance_settings() {
        let mut config = UpstreamConfig::default();
        config.upstream.id.clear();
        config.upstream.leader_stale_after_secs = 30;
        config.listener.workers = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_zero_max_fails_rejected() {
        let mut pool = Pool::new("primary");
        pool.max_fails = 0;
        let errors = validate_pool(&pool);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "pools.primary.max_fails: must be positive");
    }
}
