//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or JSON for *.json)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs loads + validates the file
//!     → server reload loop rebuilds the chain
//!     → route table and chain swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use schema::{
    AdminConfig, AuthConfig, AuthMode, CorsConfig, GatewayConfig, InterceptorConfig,
    ListenerConfig, RetryConfig, RouteConfig, TimeoutConfig, TlsConfig, TransportConfig,
    TransportMode,
};
pub use validation::validate_config;
pub use watcher::{ConfigWatcher, ReloadTrigger};
