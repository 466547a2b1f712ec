//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     address.rs (host + port → "host:port")
//!     → probe.rs (find a free base port when none is configured)
//!
//! Per endpoint, after bind:
//!     listener.rs (bounded accept loop)
//!     → connection.rs (connection IDs, active connection tracking)
//!     → Hand off to the endpoint's stages
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection gets an ID for log correlation
//! - Probing never reserves a port, binding is the source of truth

pub mod address;
pub mod connection;
pub mod listener;
pub mod probe;
