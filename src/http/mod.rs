//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, outer layers, listeners, reloads)
//!     → request.rs (request ID, transport tag)
//!     → pipeline::Chain (stages, dispatch)
//!     → response.rs (hop-by-hop stripping on the way back)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, Transport, X_REQUEST_ID};
pub use server::{build_chain, GatewayState, HttpServer};
