//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (shared accept, connection limits)
//!     → proxy.rs (one unit of work per client)
//!     → connector.rs (connect to the selected upstream host)
//!     → bytes copied both ways until either side closes
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - The dispatcher is transport-agnostic; only `Connector` knows about TCP

pub mod connector;
pub mod listener;
pub mod proxy;

pub use connector::{Connector, TcpConnector};
pub use listener::{ConnectionPermit, Listener, ListenerError};
