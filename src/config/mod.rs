//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → compiled into the route table and auth settings at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, AuthMode, ExternalConfig, IntrospectionConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, RewriteConfig, RouteConfig, TimeoutConfig, TlsConfig,
};
pub use validation::ValidationError;
