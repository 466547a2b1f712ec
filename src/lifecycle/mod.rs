//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Negotiate port → Build registry → For each endpoint, in order:
//!     construct server → bind → spawn accept loop
//!
//! Shutdown (shutdown.rs):
//!     Trigger received (or startup failed) → close each listener in
//!     start order → aggregate close errors
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → the trigger future the binary passes in
//! ```
//!
//! # Design Decisions
//! - Ordered startup, same-order shutdown (no reversal)
//! - The shutdown trigger is a parameter, never ambient global state
//! - Shutdown has a timeout per accept loop: aborted after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{close_all, ListenerOutcome, RunningListener, Shutdown};
pub use startup::{Orchestrator, Running, ServeSettings, DEFAULT_LISTEN_HOST};
