//! The accept-or-terminate capability every stage implements.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;

/// Position of a stage in the chain, outermost first.
///
/// The derive order is the only legal composition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Cors,
    Transport,
    Interception,
    Authentication,
    Dispatch,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Cors => "cors",
            StageKind::Transport => "transport",
            StageKind::Interception => "interception",
            StageKind::Authentication => "authentication",
            StageKind::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composable pipeline unit.
///
/// Given the request context and the rest of the chain, a stage either calls
/// `next.run(ctx)` or returns a terminal response. It may inspect or modify
/// the response coming back out of `next`.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn handle<'a>(&'a self, ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// The remainder of the chain after the current stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>]) -> Self {
        Self { stages }
    }

    /// Invoke the next stage.
    ///
    /// A panic inside the stage is contained here and becomes an internal
    /// error, so stages further out still see a response.
    pub async fn run(self, ctx: RequestContext) -> Response {
        let Some((stage, rest)) = self.stages.split_first() else {
            tracing::error!(request_id = %ctx.request_id(), "Chain ended without a terminal stage");
            return GatewayError::internal("middleware chain has no terminal stage").into_response();
        };

        let kind = stage.kind();
        let request_id = ctx.request_id().to_string();
        let invoke = AssertUnwindSafe(async move { stage.handle(ctx, Next::new(rest)).await });

        match invoke.catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    request_id = %request_id,
                    stage = %kind,
                    panic = %detail,
                    "Stage panicked, converting to internal error"
                );
                metrics::record_short_circuit(kind.as_str(), 500);
                GatewayError::internal(format!("stage `{}` panicked", kind))
                    .into_response_for(&request_id)
            }
        }
    }
}

/// Log and count a stage terminating the request itself.
pub fn short_circuit(kind: StageKind, ctx: &RequestContext, error: GatewayError) -> Response {
    let status = error.status();
    tracing::info!(
        request_id = %ctx.request_id(),
        stage = %kind,
        status = status.as_u16(),
        method = %ctx.method(),
        path = %ctx.path(),
        reason = %error,
        "Request short-circuited"
    );
    metrics::record_short_circuit(kind.as_str(), status.as_u16());
    error.into_response_for(ctx.request_id())
}
