//! Shutdown coordination.
//!
//! # Responsibilities
//! - Own every started listener until it is closed
//! - Close listeners in start order, collecting every failure
//! - Report how each accept loop ended
//!
//! # Design Decisions
//! - `RunningListener::close` consumes the listener: closing twice cannot compile
//! - One failed close never skips the others
//! - Only close failures are aggregated; accept loop failures are logged
//! - An accept loop that ignores close is aborted after a deadline

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Error, MultiError, Result};
use crate::observability::metrics;
use crate::server::Server;

/// Programmatic shutdown trigger.
///
/// Any number of waiters can hold a [`Shutdown::signaled`] future.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// A future that completes once [`Shutdown::trigger`] is called.
    ///
    /// Subscribes immediately, so a trigger sent after this call is never missed.
    pub fn signaled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound endpoint with its server and accept loop task.
pub struct RunningListener {
    endpoint: String,
    local_addr: SocketAddr,
    server: Arc<dyn Server>,
    task: JoinHandle<Result<()>>,
}

/// How one listener ended.
#[derive(Debug)]
pub struct ListenerOutcome {
    pub endpoint: String,
    /// Result of the server's close.
    pub close: Result<()>,
    /// Terminal result of the accept loop.
    pub accept_loop: Result<()>,
}

impl RunningListener {
    /// Start `server`'s accept loop on `listener` as its own task.
    pub(crate) fn spawn(
        endpoint: String,
        listener: TcpListener,
        server: Arc<dyn Server>,
    ) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;

        let task = tokio::spawn({
            let server = Arc::clone(&server);
            let endpoint = endpoint.clone();
            async move {
                server.serve(listener).await.map_err(|source| {
                    metrics::record_accept_loop_failure(&endpoint);
                    let err = Error::AcceptLoop { endpoint, source };
                    tracing::error!(error = %err, "Accept loop failed");
                    err
                })
            }
        });

        Ok(Self {
            endpoint,
            local_addr,
            server,
            task,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop has already returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the server and wait up to `wait` for its accept loop to return.
    pub async fn close(self, wait: Duration) -> ListenerOutcome {
        let RunningListener {
            endpoint,
            server,
            mut task,
            ..
        } = self;

        let close = server.close().await.map_err(|source| Error::Close {
            endpoint: endpoint.clone(),
            source,
        });

        let accept_loop = match tokio::time::timeout(wait, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::AcceptLoop {
                endpoint: endpoint.clone(),
                source: join_error.to_string().into(),
            }),
            Err(_) => {
                task.abort();
                tracing::warn!(
                    endpoint = %endpoint,
                    wait_secs = wait.as_secs_f64(),
                    "Accept loop still running after close, aborted"
                );
                Err(Error::AcceptLoop {
                    endpoint: endpoint.clone(),
                    source: format!("still running {:?} after close", wait).into(),
                })
            }
        };

        ListenerOutcome {
            endpoint,
            close,
            accept_loop,
        }
    }
}

/// Close every listener in order and aggregate the close failures.
///
/// An empty result means every close succeeded.
pub async fn close_all(listeners: Vec<RunningListener>, wait: Duration) -> MultiError {
    let mut errors = MultiError::new();

    for listener in listeners {
        let outcome = listener.close(wait).await;

        match outcome.close {
            Ok(()) => tracing::info!(endpoint = %outcome.endpoint, "Endpoint closed"),
            Err(e) => {
                tracing::warn!(endpoint = %outcome.endpoint, error = %e, "Endpoint failed to close");
                metrics::record_close_error(&outcome.endpoint);
                errors.push(e);
            }
        }

        if let Err(e) = outcome.accept_loop {
            tracing::debug!(endpoint = %outcome.endpoint, error = %e, "Accept loop ended with error");
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Server whose close optionally fails and whose loop optionally ignores close.
    struct TestServer {
        closed: CancellationToken,
        closes: AtomicUsize,
        fail_close: bool,
        ignore_close: bool,
    }

    impl TestServer {
        fn new(fail_close: bool, ignore_close: bool) -> Arc<Self> {
            Arc::new(Self {
                closed: CancellationToken::new(),
                closes: AtomicUsize::new(0),
                fail_close,
                ignore_close,
            })
        }
    }

    #[async_trait]
    impl Server for TestServer {
        async fn serve(&self, _listener: TcpListener) -> std::result::Result<(), BoxError> {
            if self.ignore_close {
                std::future::pending::<()>().await;
            }
            self.closed.cancelled().await;
            Ok(())
        }

        async fn close(&self) -> std::result::Result<(), BoxError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.closed.cancel();
            if self.fail_close {
                return Err("close failed".into());
            }
            Ok(())
        }
    }

    async fn spawn(name: &str, server: Arc<TestServer>) -> RunningListener {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        RunningListener::spawn(name.to_string(), listener, server).unwrap()
    }

    #[tokio::test]
    async fn test_close_all_in_order_and_aggregates() {
        let a = TestServer::new(false, false);
        let b = TestServer::new(true, false);
        let c = TestServer::new(true, false);
        let listeners = vec![
            spawn("a", Arc::clone(&a)).await,
            spawn("b", Arc::clone(&b)).await,
            spawn("c", Arc::clone(&c)).await,
        ];

        let errors = close_all(listeners, Duration::from_secs(1)).await;
        let names: Vec<&str> = errors
            .errors()
            .iter()
            .map(|e| match e {
                Error::Close { endpoint, .. } => endpoint.as_str(),
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(names, vec!["b", "c"]);

        for server in [a, b, c] {
            assert_eq!(server.closes.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_close_all_empty() {
        assert!(close_all(Vec::new(), Duration::from_secs(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_stuck_accept_loop_is_aborted() {
        let server = TestServer::new(false, true);
        let listener = spawn("stuck", server).await;

        let outcome = listener.close(Duration::from_millis(50)).await;
        assert!(outcome.close.is_ok());
        assert!(matches!(outcome.accept_loop, Err(Error::AcceptLoop { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_trigger() {
        let shutdown = Shutdown::new();
        let first = shutdown.signaled();
        let second = shutdown.signaled();

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), async {
            first.await;
            second.await;
        })
        .await
        .unwrap();
    }
}
