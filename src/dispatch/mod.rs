//! Downstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (identity attached or route open)
//!     → dispatcher.rs (lookup in snapshot, set route, build downstream URI)
//!     → security::headers (forwarding headers, credential policy)
//!     → client.rs (pooled hyper client, http/https)
//!     → resilience (deadline, retry, backoff)
//!     → http::response (strip hop-by-hop, stream back)
//! ```

pub mod client;
pub mod dispatcher;

pub use client::{build_client, HttpClient};
pub use dispatcher::Dispatcher;
