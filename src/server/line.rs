//! Line-oriented server that runs an endpoint's stages per connection.
//!
//! # Responsibilities
//! - Accept connections with a per-endpoint limit
//! - Run the stage chain for every connection on its own task
//! - Stop accepting when closed
//!
//! # Design Decisions
//! - Closing cancels a token watched by the accept loop; the socket is
//!   dropped when the loop returns
//! - Connections already handed to stages keep running after close
//! - Stage errors end that session only
//! - Accept errors caused by one peer are skipped; resource exhaustion
//!   (EMFILE, ENOBUFS, ...) backs off and retries; only errors that mean the
//!   listener itself is unusable end the loop

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::endpoint::{Endpoint, Flow, Session, Stage};
use crate::error::BoxError;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{BoundedListener, ConnectionPermit};

/// First delay after a failed accept.
const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
/// Ceiling for the doubling accept delay.
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);
use crate::server::{Server, ServerFactory};

/// Errors raised by [`LineServer`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server already closed")]
    AlreadyClosed,

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("endpoint {0} has no stages to serve")]
    NoStages(String),
}

pub struct LineServer {
    endpoint: Arc<str>,
    stages: Arc<[Arc<dyn Stage>]>,
    max_connections: usize,
    tracker: ConnectionTracker,
    closed: CancellationToken,
}

impl LineServer {
    pub fn new(endpoint: &Endpoint, max_connections: usize) -> Self {
        let name: Arc<str> = Arc::from(endpoint.name.as_str());
        Self {
            endpoint: Arc::clone(&name),
            stages: endpoint.stages.iter().cloned().collect(),
            max_connections,
            tracker: ConnectionTracker::new(name),
            closed: CancellationToken::new(),
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// How the accept loop reacts to a failed accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The peer went away before it was accepted. Accept again right away.
    Skip,
    /// Temporary exhaustion such as EMFILE. Wait, then accept again.
    Backoff,
    /// The listener is unusable.
    Fatal,
}

fn classify_accept_error(err: &io::Error) -> AcceptFailure {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => AcceptFailure::Skip,
        // EINVAL: the socket is no longer listening. `Other` only comes from
        // a closed connection limit; the OS never reports it.
        io::ErrorKind::InvalidInput | io::ErrorKind::Other => AcceptFailure::Fatal,
        _ => AcceptFailure::Backoff,
    }
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        MIN_ACCEPT_BACKOFF
    } else {
        (current * 2).min(MAX_ACCEPT_BACKOFF)
    }
}

/// Source of accepted connections for the accept loop.
#[async_trait]
trait Acceptor: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, ConnectionPermit)>;
}

#[async_trait]
impl Acceptor for BoundedListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        BoundedListener::accept(self).await
    }
}

impl LineServer {
    async fn accept_loop<A: Acceptor>(&self, acceptor: &A) -> Result<(), ServerError> {
        let mut backoff = Duration::ZERO;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Ok(()),
                accepted = acceptor.accept() => accepted,
            };

            let (stream, peer_addr, permit) = match accepted {
                Ok(connection) => {
                    backoff = Duration::ZERO;
                    connection
                }
                Err(e) => match classify_accept_error(&e) {
                    AcceptFailure::Skip => {
                        tracing::debug!(endpoint = %self.endpoint, error = %e, "Accept skipped");
                        continue;
                    }
                    AcceptFailure::Backoff => {
                        backoff = next_backoff(backoff);
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            error = %e,
                            retry_in_ms = backoff.as_millis() as u64,
                            "Accept failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = self.closed.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(backoff) => continue,
                        }
                    }
                    AcceptFailure::Fatal => return Err(ServerError::Accept(e)),
                },
            };

            let guard = self.tracker.track();
            let stages = Arc::clone(&self.stages);
            let endpoint = Arc::clone(&self.endpoint);
            tokio::spawn(async move {
                let _permit = permit;
                let mut session = Session::from_tcp(guard.id(), peer_addr, endpoint, stream);
                run_stages(&stages, &mut session).await;
                drop(guard);
            });
        }
    }
}

#[async_trait]
impl Server for LineServer {
    async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        let listener = BoundedListener::new(listener, self.max_connections);
        let address = listener.local_addr()?;
        tracing::info!(
            endpoint = %self.endpoint,
            address = %address,
            max_connections = self.max_connections,
            "Accept loop started"
        );

        self.accept_loop(&listener).await?;

        tracing::info!(endpoint = %self.endpoint, address = %address, "Accept loop stopped");
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        if self.closed.is_cancelled() {
            return Err(Box::new(ServerError::AlreadyClosed));
        }
        self.closed.cancel();
        Ok(())
    }
}

async fn run_stages(stages: &[Arc<dyn Stage>], session: &mut Session) {
    tracing::debug!(
        endpoint = session.endpoint(),
        connection_id = %session.id(),
        peer_addr = %session.peer_addr(),
        "Session started"
    );

    for stage in stages {
        match stage.handle(session).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Halt) => break,
            Err(e) => {
                tracing::debug!(
                    endpoint = session.endpoint(),
                    connection_id = %session.id(),
                    stage = stage.name(),
                    error = %e,
                    "Stage failed, ending session"
                );
                break;
            }
        }
    }

    // Bridged sessions already shut their write half down.
    if let Err(e) = session.finish().await {
        tracing::trace!(connection_id = %session.id(), error = %e, "Session shutdown failed");
    }
}

/// Builds a [`LineServer`] for every listen-enabled endpoint.
#[derive(Debug, Clone)]
pub struct LineServerFactory {
    max_connections: usize,
}

impl LineServerFactory {
    pub fn new(max_connections: usize) -> Self {
        Self { max_connections }
    }
}

impl ServerFactory for LineServerFactory {
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Server>, BoxError> {
        if endpoint.stages.is_empty() {
            return Err(Box::new(ServerError::NoStages(endpoint.name.clone())));
        }
        Ok(Arc::new(LineServer::new(endpoint, self.max_connections)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::BannerStage;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    /// Fails with the queued errors first, then accepts for real.
    struct FlakyAcceptor {
        failures: Mutex<VecDeque<io::Error>>,
        inner: BoundedListener,
    }

    impl FlakyAcceptor {
        fn new(inner: BoundedListener, failures: Vec<io::Error>) -> Self {
            Self {
                failures: Mutex::new(failures.into()),
                inner,
            }
        }
    }

    #[async_trait]
    impl Acceptor for FlakyAcceptor {
        async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, ConnectionPermit)> {
            let failure = self.failures.lock().unwrap().pop_front();
            match failure {
                Some(err) => Err(err),
                None => self.inner.accept().await,
            }
        }
    }

    fn emfile() -> io::Error {
        io::Error::from_raw_os_error(24)
    }

    #[tokio::test]
    async fn test_serves_stages_until_closed() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("welcome"));
        let server = Arc::new(LineServer::new(&endpoint, 8));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve(listener).await }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "welcome\n");

        server.close().await.unwrap();
        assert!(server.is_closed());
        task.await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_second_close_fails() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("hi"));
        let server = LineServer::new(&endpoint, 8);

        server.close().await.unwrap();
        let err = server.close().await.unwrap_err();
        assert_eq!(err.to_string(), "server already closed");
    }

    #[tokio::test]
    async fn test_serve_after_close_returns_immediately() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("hi"));
        let server = LineServer::new(&endpoint, 8);
        server.close().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve(listener).await.unwrap();
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_accept_loop_survives_transient_errors() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("still here"));
        let server = Arc::new(LineServer::new(&endpoint, 8));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = FlakyAcceptor::new(
            BoundedListener::new(listener, 8),
            vec![
                emfile(),
                emfile(),
                io::Error::from(io::ErrorKind::ConnectionAborted),
                emfile(),
            ],
        );
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept_loop(&acceptor).await }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut out = String::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out, "still here\n");
        assert!(!task.is_finished());

        server.close().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_interrupts_accept_backoff() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("hi"));
        let server = Arc::new(LineServer::new(&endpoint, 8));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let failures = (0..64).map(|_| emfile()).collect();
        let acceptor = FlakyAcceptor::new(BoundedListener::new(listener, 8), failures);
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept_loop(&acceptor).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop kept backing off after close")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_fatal_accept_error_ends_loop() {
        let endpoint = Endpoint::new("motd").with_stage(BannerStage::new("hi"));
        let server = LineServer::new(&endpoint, 8);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let acceptor = FlakyAcceptor::new(
            BoundedListener::new(listener, 8),
            vec![io::Error::from(io::ErrorKind::InvalidInput)],
        );
        let err = server.accept_loop(&acceptor).await.unwrap_err();
        assert!(matches!(err, ServerError::Accept(_)));
        assert!(!server.is_closed());
    }

    #[test]
    fn test_accept_error_classification() {
        assert_eq!(classify_accept_error(&emfile()), AcceptFailure::Backoff);
        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::ConnectionReset)),
            AcceptFailure::Skip
        );
        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::InvalidInput)),
            AcceptFailure::Fatal
        );
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let mut backoff = Duration::ZERO;
        let mut delays = Vec::new();
        for _ in 0..10 {
            backoff = next_backoff(backoff);
            delays.push(backoff.as_millis());
        }
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn test_factory_rejects_endpoints_without_stages() {
        let factory = LineServerFactory::new(8);
        let endpoint = Endpoint::new("remote").with_address("10.0.0.5:22");
        let err = factory.build(&endpoint).err().unwrap();
        assert!(err.to_string().contains("no stages"));
    }
}
