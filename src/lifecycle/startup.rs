//! Startup orchestration.
//!
//! # Responsibilities
//! - Negotiate the base port when none is configured
//! - Build the endpoint registry (directory first)
//! - Construct, bind and start one server per listen-enabled endpoint
//! - Roll back everything already started when one endpoint fails
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, there are no retries
//! - Endpoints start strictly in order, so a failure identifies exactly
//!   what was already running
//! - The rollback error list starts with the failure that caused it

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::WaypointConfig;
use crate::endpoint::{DirectoryEntry, Endpoint, Registry};
use crate::error::{Error, MultiError, Result};
use crate::lifecycle::shutdown::{close_all, RunningListener};
use crate::net::address::AddressError;
use crate::net::probe::{find_open_port, DEFAULT_PORT_CANDIDATES, DEFAULT_PROBE_TIMEOUT};
use crate::observability::metrics;
use crate::server::ServerFactory;

/// Host used when none is configured.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Settings for one orchestration pass.
#[derive(Debug, Clone)]
pub struct ServeSettings {
    /// Host every assigned address uses. Empty means [`DEFAULT_LISTEN_HOST`].
    pub listen_host: String,
    /// Directory port. Zero means negotiate over `port_candidates`.
    pub port: u16,
    pub port_candidates: Vec<u16>,
    pub probe_timeout: Duration,
    /// Connect timeout for directory jumps.
    pub connect_timeout: Duration,
    /// How long to wait for an accept loop to stop after close.
    pub close_timeout: Duration,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            listen_host: String::new(),
            port: 0,
            port_candidates: DEFAULT_PORT_CANDIDATES.to_vec(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&WaypointConfig> for ServeSettings {
    fn from(config: &WaypointConfig) -> Self {
        Self {
            listen_host: config.listen_host.clone(),
            port: config.port,
            port_candidates: config.port_candidates.clone(),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            close_timeout: Duration::from_secs(config.close_timeout_secs),
        }
    }
}

/// Brings up one listener per endpoint and tears them down together.
pub struct Orchestrator {
    settings: ServeSettings,
    endpoints: Vec<Endpoint>,
    factory: Arc<dyn ServerFactory>,
}

impl Orchestrator {
    pub fn new(
        settings: ServeSettings,
        endpoints: Vec<Endpoint>,
        factory: Arc<dyn ServerFactory>,
    ) -> Self {
        Self {
            settings,
            endpoints,
            factory,
        }
    }

    /// Start every endpoint, wait for `shutdown`, then close them all.
    pub async fn serve<F>(self, shutdown: F) -> std::result::Result<(), MultiError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        shutdown.await;
        tracing::info!(listeners = running.listeners().len(), "Stopping servers");
        running.shutdown().await
    }

    /// Start every valid, listen-enabled endpoint in registry order.
    ///
    /// On failure, everything already started is closed and the returned
    /// error lists the failure first, then any close failures.
    pub async fn start(self) -> std::result::Result<Running, MultiError> {
        let Orchestrator {
            settings,
            endpoints,
            factory,
        } = self;

        let host = if settings.listen_host.is_empty() {
            DEFAULT_LISTEN_HOST.to_string()
        } else {
            settings.listen_host.clone()
        };

        let port = match settings.port {
            0 => {
                let port =
                    find_open_port(&host, &settings.port_candidates, settings.probe_timeout).await?;
                tracing::info!(host = %host, port, "Negotiated directory port");
                port
            }
            port => port,
        };

        let registry = Registry::build(&host, port, endpoints, settings.connect_timeout)?;
        let directory = Arc::clone(registry.directory());

        let mut listeners = Vec::new();
        for endpoint in registry.into_endpoints() {
            if !endpoint.is_valid() {
                tracing::warn!(endpoint = %endpoint.name, address = ?endpoint.address, "Skipping invalid endpoint");
                continue;
            }
            if !endpoint.should_listen() {
                tracing::debug!(endpoint = %endpoint.name, "Advertising endpoint without a listener");
                continue;
            }

            match start_endpoint(factory.as_ref(), &endpoint).await {
                Ok(listener) => listeners.push(listener),
                Err(err) => {
                    tracing::error!(
                        endpoint = %endpoint.name,
                        error = %err,
                        started = listeners.len(),
                        "Endpoint failed to start, closing started endpoints"
                    );
                    let mut errors = MultiError::from(err);
                    errors.extend(close_all(listeners, settings.close_timeout).await);
                    return Err(errors);
                }
            }
        }

        Ok(Running {
            listeners,
            directory,
            close_timeout: settings.close_timeout,
        })
    }
}

async fn start_endpoint(factory: &dyn ServerFactory, endpoint: &Endpoint) -> Result<RunningListener> {
    let address = endpoint
        .address
        .as_deref()
        .ok_or_else(|| AddressError::MissingPort(endpoint.name.clone()))?;

    let server = factory
        .build(endpoint)
        .map_err(|source| Error::EndpointConstruction {
            endpoint: endpoint.name.clone(),
            source,
        })?;

    tracing::info!(endpoint = %endpoint.name, address = %address, "Starting server on ssh://{}", address);

    let bind_error = |source| Error::ListenerBind {
        endpoint: endpoint.name.clone(),
        address: address.to_string(),
        source,
    };
    let listener = TcpListener::bind(address).await.map_err(bind_error)?;
    let running =
        RunningListener::spawn(endpoint.name.clone(), listener, server).map_err(bind_error)?;

    metrics::record_listener_started(&endpoint.name);
    Ok(running)
}

/// The endpoints of a successful start, in start order.
pub struct Running {
    listeners: Vec<RunningListener>,
    directory: Arc<[DirectoryEntry]>,
    close_timeout: Duration,
}

impl Running {
    /// Started listeners, directory first.
    pub fn listeners(&self) -> &[RunningListener] {
        &self.listeners
    }

    /// The snapshot the directory stages were built from.
    pub fn directory(&self) -> &[DirectoryEntry] {
        &self.directory
    }

    /// Find a started listener by endpoint name.
    pub fn listener(&self, endpoint: &str) -> Option<&RunningListener> {
        self.listeners.iter().find(|l| l.endpoint() == endpoint)
    }

    /// Hand the listeners over for individual closing.
    pub fn into_listeners(self) -> Vec<RunningListener> {
        self.listeners
    }

    /// Close every listener in start order.
    pub async fn shutdown(self) -> std::result::Result<(), MultiError> {
        close_all(self.listeners, self.close_timeout)
            .await
            .into_result()
    }
}
