//! Shared utilities for orchestration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use waypoint::server::BannerStage;
use waypoint::{BoxError, Endpoint, Server, ServerFactory, ServeSettings};

/// Server double: answers every connection with its endpoint name.
pub struct FakeServer {
    pub name: String,
    closed: CancellationToken,
    closes: AtomicUsize,
    fail_close: bool,
    fail_serve: bool,
}

impl FakeServer {
    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Server for FakeServer {
    async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        if self.fail_serve {
            return Err("accept loop exploded".into());
        }
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    if let Ok((mut socket, _)) = accepted {
                        let _ = socket.write_all(self.name.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.closed.is_cancelled() {
            return Err("already closed".into());
        }
        self.closed.cancel();
        if self.fail_close {
            return Err(format!("{} refused to close", self.name).into());
        }
        Ok(())
    }
}

/// Factory double that records every server it builds.
#[derive(Default)]
pub struct FakeFactory {
    built: Mutex<Vec<Arc<FakeServer>>>,
    fail_build: HashSet<String>,
    fail_close: HashSet<String>,
    fail_serve: HashSet<String>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build(mut self, endpoint: &str) -> Self {
        self.fail_build.insert(endpoint.to_string());
        self
    }

    pub fn fail_close(mut self, endpoint: &str) -> Self {
        self.fail_close.insert(endpoint.to_string());
        self
    }

    pub fn fail_serve(mut self, endpoint: &str) -> Self {
        self.fail_serve.insert(endpoint.to_string());
        self
    }

    /// Servers built so far, in build order.
    pub fn built(&self) -> Vec<Arc<FakeServer>> {
        self.built.lock().unwrap().clone()
    }

    pub fn built_names(&self) -> Vec<String> {
        self.built().iter().map(|s| s.name.clone()).collect()
    }

    pub fn server(&self, name: &str) -> Arc<FakeServer> {
        self.built()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no server built for {name}"))
    }
}

impl ServerFactory for FakeFactory {
    fn build(&self, endpoint: &Endpoint) -> Result<Arc<dyn Server>, BoxError> {
        if self.fail_build.contains(&endpoint.name) {
            return Err(format!("cannot build {}", endpoint.name).into());
        }
        let server = Arc::new(FakeServer {
            name: endpoint.name.clone(),
            closed: CancellationToken::new(),
            closes: AtomicUsize::new(0),
            fail_close: self.fail_close.contains(&endpoint.name),
            fail_serve: self.fail_serve.contains(&endpoint.name),
        });
        self.built.lock().unwrap().push(Arc::clone(&server));
        Ok(server)
    }
}

/// A listen-enabled endpoint without an address.
pub fn served(name: &str) -> Endpoint {
    Endpoint::new(name).with_stage(BannerStage::new(format!("welcome to {name}")))
}

/// First port of `len` consecutive ports that were all bindable a moment ago.
pub fn free_port_block(len: u16) -> u16 {
    loop {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = first.local_addr().unwrap().port();
        if base.checked_add(len).is_none() {
            continue;
        }
        let rest: Vec<_> = (1..len)
            .filter_map(|i| std::net::TcpListener::bind(("127.0.0.1", base + i)).ok())
            .collect();
        if rest.len() == usize::from(len - 1) {
            return base;
        }
    }
}

/// Settings that negotiate `base` as the directory port on 127.0.0.1.
pub fn settings_at(base: u16) -> ServeSettings {
    ServeSettings {
        listen_host: "127.0.0.1".to_string(),
        port: 0,
        port_candidates: vec![base],
        probe_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(1),
        close_timeout: Duration::from_secs(2),
    }
}

/// Whether something accepts connections on `127.0.0.1:port`.
pub async fn is_listening(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}
