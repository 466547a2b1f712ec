//! Port negotiation by connection probing.
//!
//! # Responsibilities
//! - Find the first candidate port nobody answers on
//!
//! # Design Decisions
//! - Liveness is inferred from TCP reachability only, no registry
//! - Best effort: the port can still be taken between probe and bind,
//!   in which case the later bind fails on its own
//! - Failing to close a probe connection is fatal, not "port busy"

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::net::address::to_address;

/// Ports tried, in order, when no base port is configured.
pub const DEFAULT_PORT_CANDIDATES: [u16; 2] = [22, 2222];

/// Connect timeout for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Return the first port in `candidates` that refuses a connection on `host`.
pub async fn find_open_port(host: &str, candidates: &[u16], timeout: Duration) -> Result<u16> {
    for &port in candidates {
        let address = to_address(host, port)?;

        match tokio::time::timeout(timeout, TcpStream::connect(address.as_str())).await {
            Ok(Ok(mut stream)) => {
                tracing::debug!(address = %address, "Port occupied, trying next candidate");
                stream
                    .shutdown()
                    .await
                    .map_err(|source| Error::ProbeClose { address, source })?;
            }
            Ok(Err(e)) => {
                tracing::debug!(address = %address, error = %e, "Port free");
                return Ok(port);
            }
            Err(_) => {
                tracing::debug!(address = %address, "Probe timed out, treating port as free");
                return Ok(port);
            }
        }
    }

    Err(Error::NoPortsAvailable {
        host: host.to_string(),
        candidates: candidates.to_vec(),
    })
}
