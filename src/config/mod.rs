//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → UpstreamConfig (validated, immutable)
//!     → instance settings, lock options, seed pools
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; pools live in the shared store afterwards
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{InstanceConfig, ListenerConfig, LogFormat, ObservabilityConfig, StoreConfig, UpstreamConfig};
