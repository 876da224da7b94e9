//! Request and connection limits.
//!
//! # Responsibilities
//! - Enforce maximum request body size
//! - Bound the number of requests processed at once
//!
//! # Design Decisions
//! - Body size is enforced while streaming; oversized bodies get 413
//! - The in-flight limit is global across both listeners; excess requests
//!   wait for a permit instead of being dropped
//! - Header count is checked by the interceptor, where it can short-circuit
//!   with a proper error body

use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::schema::{ListenerConfig, SecurityConfig};

pub fn body_limit_layer(config: &SecurityConfig) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(config.max_body_size)
}

pub fn in_flight_limit_layer(config: &ListenerConfig) -> GlobalConcurrencyLimitLayer {
    GlobalConcurrencyLimitLayer::new(config.max_in_flight.max(1))
}
