//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flags / environment override the four startup integers
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → handed to RelayServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the engine is sized at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve, ConfigError, Overrides};
pub use schema::AgentConfig;
pub use schema::ForwardConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
