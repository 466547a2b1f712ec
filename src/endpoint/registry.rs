//! The working endpoint registry for one orchestration pass.
//!
//! # Responsibilities
//! - Assign sequential ports to listen-enabled endpoints without an address
//! - Snapshot the resolved endpoints for the directory stages
//! - Prepend the synthetic directory endpoint at position zero
//!
//! # Design Decisions
//! - Address assignment is a fold: the last assigned port is threaded
//!   through the pass instead of living in shared state
//! - Addresses are resolved before the directory is built, so the listing
//!   shows real addresses, never placeholders
//! - The snapshot is immutable for the lifetime of the run

use std::sync::Arc;
use std::time::Duration;

use crate::directory::{CommandsStage, ListingStage};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::net::address::to_address;

/// Name of the synthetic directory endpoint.
pub const DIRECTORY_ENDPOINT_NAME: &str = "list";

/// One advertised endpoint, as the directory shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub address: String,
}

/// Ordered endpoints for one pass, directory first.
#[derive(Debug)]
pub struct Registry {
    endpoints: Vec<Endpoint>,
    directory: Arc<[DirectoryEntry]>,
}

impl Registry {
    /// Resolve `configured` against `host:port` and prepend the directory endpoint.
    ///
    /// The directory listens on `host:port`; configured endpoints without an
    /// address get `port + 1`, `port + 2`, ... in order.
    pub fn build(
        host: &str,
        port: u16,
        configured: Vec<Endpoint>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let directory_address = to_address(host, port)?;
        let configured = assign_addresses(host, port, configured)?;
        let directory = snapshot(&configured);

        let directory_endpoint = Endpoint::new(DIRECTORY_ENDPOINT_NAME)
            .with_address(directory_address)
            .with_stage(ListingStage::new(Arc::clone(&directory)))
            .with_stage(CommandsStage::new(Arc::clone(&directory), connect_timeout));

        let mut endpoints = Vec::with_capacity(configured.len() + 1);
        endpoints.push(directory_endpoint);
        endpoints.extend(configured);

        Ok(Self {
            endpoints,
            directory,
        })
    }

    /// All endpoints, directory first, configured order after.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// What the directory advertises.
    pub fn directory(&self) -> &Arc<[DirectoryEntry]> {
        &self.directory
    }

    pub fn into_endpoints(self) -> Vec<Endpoint> {
        self.endpoints
    }
}

/// Give every valid, listen-enabled endpoint lacking an address the next port after `base_port`.
///
/// Endpoints that are skipped (invalid, not listening, explicit address) consume no port.
pub fn assign_addresses(host: &str, base_port: u16, endpoints: Vec<Endpoint>) -> Result<Vec<Endpoint>> {
    let (assigned, _last) = endpoints.into_iter().try_fold(
        (Vec::new(), base_port),
        |(mut assigned, last), mut endpoint| {
            let mut next = last;
            if endpoint.address.is_none() && endpoint.is_valid() && endpoint.should_listen() {
                next = last
                    .checked_add(1)
                    .ok_or(Error::PortRangeExhausted { last })?;
                endpoint.address = Some(to_address(host, next)?);
            }
            assigned.push(endpoint);
            Ok::<_, Error>((assigned, next))
        },
    )?;
    Ok(assigned)
}

/// Valid endpoints with their resolved addresses, in order.
fn snapshot(endpoints: &[Endpoint]) -> Arc<[DirectoryEntry]> {
    endpoints
        .iter()
        .filter(|e| e.is_valid())
        .filter_map(|e| {
            e.address.as_ref().map(|address| DirectoryEntry {
                name: e.name.clone(),
                address: address.clone(),
            })
        })
        .collect()
}
