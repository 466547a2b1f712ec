//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate and reserved endpoint names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WaypointConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::WaypointConfig;
use crate::endpoint::DIRECTORY_ENDPOINT_NAME;
use crate::net::address::{split_address, to_address, AddressError};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listen_host: {0}")]
    ListenHost(AddressError),

    #[error("port_candidates must not be empty when port is 0")]
    NoPortCandidates,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("endpoint #{index}: name is empty")]
    EmptyEndpointName { index: usize },

    #[error("endpoint {name}: duplicate name")]
    DuplicateEndpointName { name: String },

    #[error("endpoint {name}: name is reserved for the directory")]
    ReservedEndpointName { name: String },

    #[error("endpoint {name}: {reason}")]
    EndpointAddress { name: String, reason: AddressError },

    #[error("endpoint {name}: needs an address or a banner")]
    NothingToServe { name: String },

    #[error("metrics.address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &WaypointConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.listen_host.is_empty() {
        if let Err(e) = to_address(&config.listen_host, 0) {
            errors.push(ValidationError::ListenHost(e));
        }
    }

    if config.port == 0 && config.port_candidates.is_empty() {
        errors.push(ValidationError::NoPortCandidates);
    }

    for (field, value) in [
        ("probe_timeout_ms", config.probe_timeout_ms),
        ("connect_timeout_secs", config.connect_timeout_secs),
        ("close_timeout_secs", config.close_timeout_secs),
        ("max_connections", config.max_connections as u64),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let mut seen = HashSet::new();
    for (index, endpoint) in config.endpoints.iter().enumerate() {
        let name = endpoint.name.trim();
        if name.is_empty() {
            errors.push(ValidationError::EmptyEndpointName { index });
            continue;
        }
        if name == DIRECTORY_ENDPOINT_NAME {
            errors.push(ValidationError::ReservedEndpointName { name: name.to_string() });
        }
        if !seen.insert(name) {
            errors.push(ValidationError::DuplicateEndpointName { name: name.to_string() });
        }

        match &endpoint.address {
            Some(address) => {
                if let Err(reason) = split_address(address) {
                    errors.push(ValidationError::EndpointAddress {
                        name: name.to_string(),
                        reason,
                    });
                }
            }
            None if endpoint.banner.is_none() => {
                errors.push(ValidationError::NothingToServe { name: name.to_string() });
            }
            None => {}
        }
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(config.metrics.address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;

    fn endpoint(name: &str, address: Option<&str>, banner: Option<&str>) -> EndpointConfig {
        EndpointConfig {
            name: name.into(),
            address: address.map(Into::into),
            banner: banner.map(Into::into),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&WaypointConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = WaypointConfig::default();
        config.listen_host = "bad host".into();
        config.port_candidates.clear();
        config.probe_timeout_ms = 0;
        config.endpoints = vec![
            endpoint("", None, Some("hi")),
            endpoint("app", None, Some("hi")),
            endpoint("app", Some("nope"), None),
            endpoint("list", Some("10.0.0.1:22"), None),
            endpoint("ghost", None, None),
        ];
        config.metrics.enabled = true;
        config.metrics.address = "not-an-addr".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ListenHost(AddressError::InvalidHost("bad host".into())),
                ValidationError::NoPortCandidates,
                ValidationError::Zero { field: "probe_timeout_ms" },
                ValidationError::EmptyEndpointName { index: 0 },
                ValidationError::DuplicateEndpointName { name: "app".into() },
                ValidationError::EndpointAddress {
                    name: "app".into(),
                    reason: AddressError::MissingPort("nope".into()),
                },
                ValidationError::ReservedEndpointName { name: "list".into() },
                ValidationError::NothingToServe { name: "ghost".into() },
                ValidationError::MetricsAddress("not-an-addr".into()),
            ]
        );
    }

    #[test]
    fn test_fixed_port_needs_no_candidates() {
        let mut config = WaypointConfig::default();
        config.port = 2222;
        config.port_candidates.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::Zero { field: "max_connections" };
        assert_eq!(err.to_string(), "max_connections must be greater than zero");
    }
}
