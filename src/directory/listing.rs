//! Listing stage: shows every advertised endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::{DirectoryEntry, Flow, Session, Stage};

pub struct ListingStage {
    entries: Arc<[DirectoryEntry]>,
}

impl ListingStage {
    pub fn new(entries: Arc<[DirectoryEntry]>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }
}

/// Render the numbered listing, one line per entry.
pub fn render(entries: &[DirectoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No endpoints available.".to_string()];
    }
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push("Available endpoints:".to_string());
    for (i, entry) in entries.iter().enumerate() {
        lines.push(format!(
            "  {:>2}) {:<width$}  ssh://{}",
            i + 1,
            entry.name,
            entry.address,
            width = width
        ));
    }
    lines
}

#[async_trait]
impl Stage for ListingStage {
    fn name(&self) -> &str {
        "listing"
    }

    async fn handle(&self, session: &mut Session) -> std::io::Result<Flow> {
        for line in render(&self.entries) {
            session.write_line(&line).await?;
        }
        Ok(Flow::Continue)
    }
}
