//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Plain listener (axum::serve)  ─┐
//!                                ├→ http::server (Transport tagged per listener)
//! TLS listener (axum-server)    ─┘
//!         ↑
//!     tls.rs (certificate + key from disk)
//! ```
//!
//! # Design Decisions
//! - TLS is optional and terminated in-process with rustls
//! - Certificate provisioning is external; only file paths are configured

pub mod tls;

pub use tls::load_tls_config;
