//! API gateway library.
//!
//! A single entry point in front of internal services: every request passes
//! CORS, transport security, interception and authentication stages before
//! the dispatcher maps it onto a downstream service by route.

pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::{ConfigurationError, GatewayError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
