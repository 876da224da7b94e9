//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound request (+ route table snapshot, cancellation token)
//!     → cors.rs          preflight / response decoration
//!     → transport.rs     redirect or reject plain HTTP
//!     → intercept.rs     structural checks, header hygiene
//!     → authenticate.rs  credential → Identity, scopes
//!     → dispatch         match, rewrite, forward, stream back
//! ```
//!
//! # Design Decisions
//! - The chain is an explicit list of stage objects built by `ChainBuilder`;
//!   the builder rejects any other order
//! - Any stage may short-circuit; outer stages still see the response
//! - A panic in a stage is contained at that stage's boundary

pub mod authenticate;
pub mod chain;
pub mod context;
pub mod cors;
pub mod intercept;
pub mod stage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use authenticate::AuthenticationStage;
pub use chain::{Chain, ChainBuilder};
pub use context::RequestContext;
pub use cors::CorsStage;
pub use intercept::{HeaderPolicyInterceptor, Interceptor, InterceptorStage, Verdict};
pub use stage::{short_circuit, Next, Stage, StageKind};
pub use transport::{SecureTransport, TransportStage};
