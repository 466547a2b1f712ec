//! Waypoint: a set of SSH-style endpoints behind one directory.
//!
//! Brings up one listener per configured endpoint plus a synthetic
//! directory endpoint that lists the others and jumps to them, and tears
//! the whole set down together on failure or shutdown.

pub mod config;
pub mod directory;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use config::WaypointConfig;
pub use endpoint::{Endpoint, Flow, Session, Stage};
pub use error::{BoxError, Error, MultiError};
pub use lifecycle::{Orchestrator, ServeSettings, Shutdown};
pub use server::{Server, ServerFactory};
