//! Stages of the synthetic directory endpoint.
//!
//! # Data Flow
//! ```text
//! client connects to the directory endpoint
//!     → listing.rs (numbered list of advertised endpoints)
//!     → commands.rs (read a name or number, bridge to that endpoint)
//! ```
//!
//! # Design Decisions
//! - Both stages share one immutable snapshot built before any listener starts
//! - Navigation is a plain TCP bridge, the target does its own handshake

pub mod commands;
pub mod listing;

pub use commands::CommandsStage;
pub use listing::ListingStage;

use crate::endpoint::DirectoryEntry;

/// Find an entry by exact name or by its 1-based position in the listing.
pub fn lookup<'a>(entries: &'a [DirectoryEntry], query: &str) -> Option<&'a DirectoryEntry> {
    let query = query.trim();
    entries.iter().find(|e| e.name == query).or_else(|| {
        query
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| entries.get(i))
    })
}
