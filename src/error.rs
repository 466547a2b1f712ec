//! Error types for orchestration and the aggregated shutdown error.
//!
//! # Design Decisions
//! - One error enum for every failure the orchestrator can observe
//! - Startup errors are fatal and trigger rollback of started listeners
//! - Shutdown errors are never dropped: they accumulate in `MultiError`
//!   in the order they happened, the triggering error always first

use std::fmt;

use thiserror::Error;

use crate::net::address::AddressError;

/// Boxed error returned by injected collaborators (server factory, servers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while starting, running or stopping endpoint listeners.
#[derive(Debug, Error)]
pub enum Error {
    /// Every candidate port answered a probe connection.
    #[error("no ports available on {host} (tried {candidates:?})")]
    NoPortsAvailable { host: String, candidates: Vec<u16> },

    /// A probe connection to an occupied port could not be closed.
    #[error("failed to close port probe to {address}: {source}")]
    ProbeClose {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A host or address could not be turned into a listenable address.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// Sequential assignment ran past the last TCP port.
    #[error("no port left to assign after {last}")]
    PortRangeExhausted { last: u16 },

    /// The server factory rejected an endpoint.
    #[error("failed to construct server for endpoint {endpoint}: {source}")]
    EndpointConstruction {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    /// Binding the endpoint's TCP listener failed.
    #[error("failed to bind {address} for endpoint {endpoint}: {source}")]
    ListenerBind {
        endpoint: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// An accept loop terminated abnormally. Logged, never aggregated.
    #[error("accept loop for endpoint {endpoint} failed: {source}")]
    AcceptLoop {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    /// A server failed to close cleanly.
    #[error("failed to close endpoint {endpoint}: {source}")]
    Close {
        endpoint: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// True for failures that happen while negotiating the base port.
    pub fn is_port_negotiation(&self) -> bool {
        matches!(self, Error::NoPortsAvailable { .. } | Error::ProbeClose { .. })
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An ordered collection of independent errors reported together.
///
/// Errors are appended in the order they occur; an empty collection means
/// success (see [`MultiError::into_result`]).
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error, preserving order.
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Append every error of `other` after the ones already collected.
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The collected errors, oldest first.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The first error collected, usually the one that triggered shutdown.
    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// `Ok(())` when nothing was collected, the aggregate otherwise.
    pub fn into_result(self) -> std::result::Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Error> for MultiError {
    fn from(error: Error) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for MultiError {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "no errors"),
            [only] => write!(f, "{}", only),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for err in errors {
                    write!(f, "\n\t* {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
