//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → store.rs (snapshot of the active table)
//!     → table.rs (bucket by segment count, scan candidates)
//!     → pattern.rs (segment-wise match, bind named segments)
//!     → Return: Matched(route + params) | MethodNotAllowed | NotFound
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Compile patterns and templates
//!     → Reject overlaps (same method, same concrete path)
//!     → Freeze as immutable RouteTable
//!     → Atomic swap into RouteStore
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load time, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: at most one route can match a (method, path) pair

pub mod pattern;
pub mod store;
pub mod table;

pub use pattern::{PathParams, PathPattern};
pub use store::{RouteStore, Snapshot};
pub use table::{Lookup, MethodSet, Route, RouteMatch, RouteTable};
