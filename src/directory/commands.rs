//! Commands stage: lets a session jump to an advertised endpoint.
//!
//! # Commands
//! - `<name>` or `<number>`: bridge the session to that endpoint
//! - `list`: show the listing again
//! - `help`: show the commands
//! - `exit` / `quit`: end the session

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::directory::{listing, lookup};
use crate::endpoint::{DirectoryEntry, Flow, Session, Stage};
use crate::observability::metrics;

const PROMPT: &str = "> ";

const HELP: &[&str] = &[
    "Commands:",
    "  <name> | <number>  connect to an endpoint",
    "  list               show endpoints",
    "  exit               disconnect",
];

pub struct CommandsStage {
    entries: Arc<[DirectoryEntry]>,
    connect_timeout: Duration,
}

impl CommandsStage {
    pub fn new(entries: Arc<[DirectoryEntry]>, connect_timeout: Duration) -> Self {
        Self {
            entries,
            connect_timeout,
        }
    }

    /// Bridge to `entry`. Returns false if the target could not be reached.
    async fn jump(&self, session: &mut Session, entry: &DirectoryEntry) -> std::io::Result<bool> {
        tracing::info!(
            endpoint = session.endpoint(),
            connection_id = %session.id(),
            jump_target = %entry.name,
            address = %entry.address,
            "Jumping to endpoint"
        );

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(entry.address.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(jump_target = %entry.name, error = %e, "Jump target unreachable");
                session
                    .write_line(&format!("failed to reach {}: {}", entry.name, e))
                    .await?;
                return Ok(false);
            }
            Err(_) => {
                tracing::warn!(jump_target = %entry.name, "Jump target timed out");
                session
                    .write_line(&format!("timed out connecting to {}", entry.name))
                    .await?;
                return Ok(false);
            }
        };

        metrics::record_jump(&entry.name);
        session
            .write_line(&format!("connecting to {} ({})", entry.name, entry.address))
            .await?;
        let (sent, received) = session.bridge(stream).await?;
        tracing::debug!(
            connection_id = %session.id(),
            jump_target = %entry.name,
            bytes_sent = sent,
            bytes_received = received,
            "Jump finished"
        );
        Ok(true)
    }
}

#[async_trait]
impl Stage for CommandsStage {
    fn name(&self) -> &str {
        "commands"
    }

    async fn handle(&self, session: &mut Session) -> std::io::Result<Flow> {
        loop {
            session.write_str(PROMPT).await?;
            let line = match session.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(Flow::Halt),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::debug!(connection_id = %session.id(), error = %e, "Rejected input line");
                    session.write_line(&format!("rejected: {}", e)).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match line.trim() {
                "" => {}
                "exit" | "quit" => {
                    session.write_line("bye").await?;
                    return Ok(Flow::Halt);
                }
                "list" | "ls" => {
                    for line in listing::render(&self.entries) {
                        session.write_line(&line).await?;
                    }
                }
                "help" | "?" => {
                    for line in HELP {
                        session.write_line(line).await?;
                    }
                }
                query => match lookup(&self.entries, query) {
                    Some(entry) => {
                        if self.jump(session, entry).await? {
                            return Ok(Flow::Halt);
                        }
                    }
                    None => {
                        session
                            .write_line(&format!("unknown endpoint: {}", query))
                            .await?;
                    }
                },
            }
        }
    }
}
