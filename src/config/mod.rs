//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → per-service limits resolved at pool creation
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a client is constructed
//! - All fields except the HTTP/2 stream cap have defaults
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ClientConfig, PoolLimits, PoolOverrides, ReadTimeoutPolicy, ServiceConfig};
pub use validation::{validate_config, ValidationError};
