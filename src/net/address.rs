//! Address resolution.
//!
//! # Responsibilities
//! - Join a host and a port into the canonical `host:port` form
//! - Split and validate explicit `host:port` endpoint addresses
//!
//! # Design Decisions
//! - Pure functions, no DNS lookups
//! - IPv6 literals are always bracketed in the joined form
//! - Malformed hosts fail immediately instead of at bind time

use thiserror::Error;

/// Errors raised while resolving or parsing an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("host is empty")]
    EmptyHost,

    #[error("malformed host {0:?}")]
    InvalidHost(String),

    #[error("missing port in address {0:?}")]
    MissingPort(String),

    #[error("invalid port in address {0:?}")]
    InvalidPort(String),
}

/// Join `host` and `port` into `host:port`, bracketing IPv6 hosts.
pub fn to_address(host: &str, port: u16) -> Result<String, AddressError> {
    validate_host(host)?;
    if host.starts_with('[') || !host.contains(':') {
        Ok(format!("{}:{}", host, port))
    } else {
        Ok(format!("[{}]:{}", host, port))
    }
}

/// Split an explicit `host:port` address into its unbracketed host and port.
pub fn split_address(address: &str) -> Result<(String, u16), AddressError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| AddressError::MissingPort(address.to_string()))?;

    // "::1" splits into ":" and "1": a bare IPv6 literal without a port.
    if host.contains(':') && !host.starts_with('[') {
        return Err(AddressError::MissingPort(address.to_string()));
    }
    validate_host(host)?;

    let port = port
        .parse::<u16>()
        .map_err(|_| AddressError::InvalidPort(address.to_string()))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host.to_string(), port))
}

fn validate_host(host: &str) -> Result<(), AddressError> {
    if host.is_empty() {
        return Err(AddressError::EmptyHost);
    }
    let invalid = || AddressError::InvalidHost(host.to_string());

    if host.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(invalid());
    }

    match host.strip_prefix('[') {
        Some(rest) => {
            let inner = rest.strip_suffix(']').ok_or_else(invalid)?;
            if inner.is_empty() || inner.contains(['[', ']']) || !inner.contains(':') {
                return Err(invalid());
            }
        }
        None if host.contains(['[', ']']) => return Err(invalid()),
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_address_ipv4_and_hostname() {
        assert_eq!(to_address("127.0.0.1", 22).unwrap(), "127.0.0.1:22");
        assert_eq!(to_address("localhost", 2222).unwrap(), "localhost:2222");
    }

    #[test]
    fn test_to_address_ipv6() {
        assert_eq!(to_address("::1", 22).unwrap(), "[::1]:22");
        assert_eq!(to_address("[::1]", 22).unwrap(), "[::1]:22");
        assert_eq!(to_address("fe80::1%eth0", 23).unwrap(), "[fe80::1%eth0]:23");
    }

    #[test]
    fn test_to_address_rejects_malformed_hosts() {
        assert_eq!(to_address("", 22), Err(AddressError::EmptyHost));
        assert!(matches!(to_address("bad host", 22), Err(AddressError::InvalidHost(_))));
        assert!(matches!(to_address("[::1", 22), Err(AddressError::InvalidHost(_))));
        assert!(matches!(to_address("::1]", 22), Err(AddressError::InvalidHost(_))));
        assert!(matches!(to_address("[]", 22), Err(AddressError::InvalidHost(_))));
        assert!(matches!(to_address("a/b", 22), Err(AddressError::InvalidHost(_))));
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address("127.0.0.1:2222").unwrap(), ("127.0.0.1".to_string(), 2222));
        assert_eq!(split_address("[::1]:22").unwrap(), ("::1".to_string(), 22));
        assert_eq!(split_address("example.com:0").unwrap(), ("example.com".to_string(), 0));
    }

    #[test]
    fn test_split_address_errors() {
        assert!(matches!(split_address("example.com"), Err(AddressError::MissingPort(_))));
        assert!(matches!(split_address("::1"), Err(AddressError::MissingPort(_))));
        assert!(matches!(split_address("host:ssh"), Err(AddressError::InvalidPort(_))));
        assert!(matches!(split_address("host:70000"), Err(AddressError::InvalidPort(_))));
        assert_eq!(split_address(":22"), Err(AddressError::EmptyHost));
    }

    #[test]
    fn test_join_then_split() {
        let joined = to_address("::1", 2223).unwrap();
        assert_eq!(split_address(&joined).unwrap(), ("::1".to_string(), 2223));
    }
}
