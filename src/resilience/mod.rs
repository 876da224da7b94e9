//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream exchange:
//!     → timeouts.rs (one deadline per request, shared by every attempt)
//!     → On failure: retries.rs (idempotent + retryable outcome + attempts left?)
//!     → backoff.rs (jittered delay, only if it fits in the deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every downstream call has a deadline
//! - Retries are opt-in per route and only for idempotent methods
//! - Backoff sleeps count against the same deadline as the attempts

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use retries::{is_retryable, RetryPolicy};
pub use timeouts::Deadline;
