//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → ManagerOptions for the StreamManager, TcpRuntime settings, logging
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a manager is built from one snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AdmissionConfig, EvictionConfig, IoConfig, ListenerConfig, ManagerConfig, ObservabilityConfig};
pub use validation::ValidationError;
