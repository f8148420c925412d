//! Upstream selection core for a TCP load balancer.
//!
//! Pools of weighted hosts are kept in a store shared by every worker. A
//! request picks a live host by weighted random draw, fails over host by host
//! and then pool by pool in priority order, and reports its failures after
//! it finishes. One elected worker per instance brings failed hosts back once
//! their timeout has passed.

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod store;
pub mod upstream;

pub use config::schema::UpstreamConfig;
pub use error::{UpstreamError, UpstreamResult};
pub use health::WorkerId;
pub use lifecycle::Shutdown;
pub use store::{MemoryStore, SharedStore};
pub use upstream::{Selected, UnitOfWork, Upstream};
