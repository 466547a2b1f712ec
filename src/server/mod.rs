//! Server construction seam.
//!
//! # Responsibilities
//! - Define what the orchestrator needs from a protocol server
//! - Define how servers are built from endpoint descriptions
//! - Ship a line-oriented default server for the binary
//!
//! # Design Decisions
//! - The orchestrator binds sockets; servers only run accept loops on them
//! - `close` stops accepting; in-flight connections are not drained
//! - Closures work as factories, which keeps test doubles small

pub mod banner;
pub mod line;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;

use crate::endpoint::Endpoint;
use crate::error::BoxError;

pub use banner::BannerStage;
pub use line::{LineServer, LineServerFactory, ServerError};

/// A protocol server bound to one endpoint.
#[async_trait]
pub trait Server: Send + Sync {
    /// Run the accept loop until the server is closed or fails.
    async fn serve(&self, listener: TcpListener) -> Result<(), BoxError>;

    /// Stop accepting connections. Closing twice is an error.
    async fn close(&self) -> Result<(), BoxError>;
}

/// Builds a server for an endpoint.
pub trait ServerFactory: Send + Sync {
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Server>, BoxError>;
}

impl<F> ServerFactory for F
where
    F: Fn(&Endpoint) -> Result<Arc<dyn Server>, BoxError> + Send + Sync,
{
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Server>, BoxError> {
        self(endpoint)
    }
}
