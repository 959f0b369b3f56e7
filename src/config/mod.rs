//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → HealthPolicy / TimeoutPolicy handed to constructors
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend list never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, HealthConfig, HealthPolicy, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, ShutdownConfig, TimeoutConfig, TimeoutPolicy,
};
pub use validation::{validate_config, ValidationError};
