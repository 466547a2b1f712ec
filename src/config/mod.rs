//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → WaypointConfig (validated, immutable)
//!     → CLI overrides applied by the binary
//!     → ServeSettings + endpoints handed to the orchestrator
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the endpoint snapshot lives for the run
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{EndpointConfig, LogFormat, LoggingConfig, MetricsConfig, WaypointConfig};
pub use validation::{validate_config, ValidationError};
