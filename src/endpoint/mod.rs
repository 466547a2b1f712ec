//! Endpoint descriptions and the connection stage abstraction.
//!
//! # Data Flow
//! ```text
//! configured endpoints
//!     → registry.rs (assign addresses, snapshot for the directory,
//!                    prepend the directory endpoint)
//!     → orchestrator (one listener per valid, listen-enabled endpoint)
//!
//! per accepted connection:
//!     session.rs (line-oriented Session)
//!     → stages run in order until one halts
//! ```
//!
//! # Design Decisions
//! - An endpoint without stages is a pure directory entry: advertised, never bound
//! - Stages are shared trait objects so a stage set can back many servers

pub mod registry;
pub mod session;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::net::address::split_address;

pub use registry::{DirectoryEntry, Registry, DIRECTORY_ENDPOINT_NAME};
pub use session::{LineError, Session};

/// What the stage chain does after a stage returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hand the session to the next stage.
    Continue,
    /// Stop the chain and end the session.
    Halt,
}

/// One connection-handling step attached to an endpoint's server.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn handle(&self, session: &mut Session) -> std::io::Result<Flow>;
}

/// One server to run, or one address to advertise.
#[derive(Clone)]
pub struct Endpoint {
    /// Identifies the endpoint in logs and in the directory.
    pub name: String,
    /// Explicit `host:port`. Assigned sequentially when absent.
    pub address: Option<String>,
    /// Stages run for every connection, in order.
    pub stages: Vec<Arc<dyn Stage>>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            stages: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Declared fields are consistent: a name, a parseable address if any,
    /// and something to either serve or advertise.
    pub fn is_valid(&self) -> bool {
        if self.name.trim().is_empty() {
            return false;
        }
        match &self.address {
            Some(address) => split_address(address).is_ok(),
            None => !self.stages.is_empty(),
        }
    }

    /// Whether a listener should be bound for this endpoint.
    pub fn should_listen(&self) -> bool {
        !self.stages.is_empty()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("stages", &stages)
            .finish()
    }
}
