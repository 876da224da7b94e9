//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Stages, dispatcher, reload loop
//!     → logging.rs  tracing events keyed by request_id
//!     → metrics.rs  request / short-circuit / upstream / reload series
//!
//! Exported as:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape listener on observability.metrics_address
//! ```
//!
//! # Design Decisions
//! - Every short-circuit is counted with the stage that produced it
//! - Request ID is carried onto downstream calls as `x-request-id`

pub mod logging;
pub mod metrics;
