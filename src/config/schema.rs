//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::net::probe::DEFAULT_PORT_CANDIDATES;
use crate::server::BannerStage;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WaypointConfig {
    /// Host every assigned address uses (empty = 127.0.0.1).
    pub listen_host: String,

    /// Directory port. 0 negotiates one from `port_candidates`.
    pub port: u16,

    /// Ports probed, in order, when `port` is 0.
    pub port_candidates: Vec<u16>,

    /// Connect timeout for a single port probe, in milliseconds.
    pub probe_timeout_ms: u64,

    /// Connect timeout for directory jumps, in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for an accept loop to stop after close, in seconds.
    pub close_timeout_secs: u64,

    /// Maximum concurrent connections per endpoint (backpressure).
    pub max_connections: usize,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,

    /// Endpoints, in listing and port assignment order.
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            listen_host: String::new(),
            port: 0,
            port_candidates: DEFAULT_PORT_CANDIDATES.to_vec(),
            probe_timeout_ms: 1000,
            connect_timeout_secs: 10,
            close_timeout_secs: 5,
            max_connections: 1024,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

impl WaypointConfig {
    /// Endpoint descriptions for the orchestrator, in configured order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.iter().map(EndpointConfig::to_endpoint).collect()
    }
}

/// One configured endpoint.
///
/// With a banner it is served by the built-in line server; without one it
/// is only advertised by the directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub name: String,

    /// Explicit `host:port`. Assigned sequentially when absent.
    #[serde(default)]
    pub address: Option<String>,

    /// Text shown to every connection.
    #[serde(default)]
    pub banner: Option<String>,
}

impl EndpointConfig {
    pub fn to_endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::new(self.name.clone());
        if let Some(address) = &self.address {
            endpoint = endpoint.with_address(address.clone());
        }
        if let Some(banner) = &self.banner {
            endpoint = endpoint.with_stage(BannerStage::new(banner.clone()));
        }
        endpoint
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "waypoint=debug".
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "waypoint=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape listener.
    pub enabled: bool,

    /// Scrape listener address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}
