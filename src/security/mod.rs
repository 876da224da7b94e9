//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (in-flight permits, streaming body size)
//!     → [pipeline: transport, interception, authentication]
//!     → headers.rs (sanitize, add X-Forwarded-*, identity, credential policy)
//!     → Dispatch
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input; the identity header is always rewritten

pub mod headers;
pub mod limits;
