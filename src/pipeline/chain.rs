//! Explicit chain composition.
//!
//! # Design Decisions
//! - The builder, not registration side effects, fixes the order
//! - Order is checked at build time: each kind at most once, strictly
//!   outer-to-inner, and the dispatcher last
//! - Stages may be omitted (e.g. no CORS) but never reordered

use std::sync::Arc;

use axum::response::Response;

use crate::error::ConfigurationError;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{Next, Stage, StageKind};

/// An ordered, validated list of stages ending in the dispatcher.
#[derive(Clone)]
pub struct Chain {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Run a request through every stage.
    pub async fn execute(&self, ctx: RequestContext) -> Response {
        Next::new(&self.stages).run(ctx).await
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("stages", &self.kinds()).finish()
    }
}

#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl ChainBuilder {
    /// Append a stage (innermost so far).
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Result<Chain, ConfigurationError> {
        let kinds: Vec<StageKind> = self.stages.iter().map(|s| s.kind()).collect();

        if kinds.last() != Some(&StageKind::Dispatch) {
            return Err(ConfigurationError::invalid(
                "pipeline",
                "the dispatcher must be the innermost stage",
            ));
        }

        for pair in kinds.windows(2) {
            if pair[0] >= pair[1] {
                return Err(ConfigurationError::invalid(
                    "pipeline",
                    format!("stage `{}` cannot run before `{}`", pair[0], pair[1]),
                ));
            }
        }

        tracing::debug!(stages = ?kinds, "Middleware chain built");
        Ok(Chain {
            stages: self.stages.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::{
        body::Body,
        http::{HeaderValue, Request, StatusCode},
        response::IntoResponse,
    };
    use futures_util::future::{BoxFuture, FutureExt};
    use tokio_util::sync::CancellationToken;

    use crate::routing::RouteTable;

    /// Records its position and passes through.
    struct Recorder {
        kind: StageKind,
        log: Arc<Mutex<Vec<StageKind>>>,
        terminate: bool,
    }

    impl Stage for Recorder {
        fn kind(&self) -> StageKind {
            self.kind
        }

        fn handle<'a>(&'a self, ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response> {
            async move {
                self.log.lock().unwrap().push(self.kind);
                if self.terminate {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                let mut response = next.run(ctx).await;
                response
                    .headers_mut()
                    .append("x-visited", HeaderValue::from_static(self.kind.as_str()));
                response
            }
            .boxed()
        }
    }

    struct Panicker;

    impl Stage for Panicker {
        fn kind(&self) -> StageKind {
            StageKind::Dispatch
        }

        fn handle<'a>(&'a self, _ctx: RequestContext, _next: Next<'a>) -> BoxFuture<'a, Response> {
            async move { panic!("dispatcher exploded") }.boxed()
        }
    }

    fn recorder(kind: StageKind, log: &Arc<Mutex<Vec<StageKind>>>, terminate: bool) -> Recorder {
        Recorder {
            kind,
            log: log.clone(),
            terminate,
        }
    }

    fn ctx() -> RequestContext {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        RequestContext::new(request, Arc::new(RouteTable::default()), CancellationToken::new())
    }

    #[test]
    fn rejects_out_of_order_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = Chain::builder()
            .stage(recorder(StageKind::Authentication, &log, false))
            .stage(recorder(StageKind::Interception, &log, false))
            .stage(recorder(StageKind::Dispatch, &log, false))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_dispatcher_and_duplicates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(Chain::builder()
            .stage(recorder(StageKind::Cors, &log, false))
            .build()
            .is_err());
        assert!(Chain::builder()
            .stage(recorder(StageKind::Cors, &log, false))
            .stage(recorder(StageKind::Cors, &log, false))
            .stage(recorder(StageKind::Dispatch, &log, false))
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn runs_outer_to_inner_and_unwinds_inner_to_outer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(recorder(StageKind::Cors, &log, false))
            .stage(recorder(StageKind::Transport, &log, false))
            .stage(recorder(StageKind::Interception, &log, false))
            .stage(recorder(StageKind::Authentication, &log, false))
            .stage(recorder(StageKind::Dispatch, &log, true))
            .build()
            .unwrap();

        let response = chain.execute(ctx()).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                StageKind::Cors,
                StageKind::Transport,
                StageKind::Interception,
                StageKind::Authentication,
                StageKind::Dispatch,
            ]
        );
        let visited: Vec<_> = response
            .headers()
            .get_all("x-visited")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(visited, vec!["authentication", "interception", "transport", "cors"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(recorder(StageKind::Cors, &log, false))
            .stage(recorder(StageKind::Authentication, &log, true))
            .stage(recorder(StageKind::Dispatch, &log, false))
            .build()
            .unwrap();

        let response = chain.execute(ctx()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            *log.lock().unwrap(),
            vec![StageKind::Cors, StageKind::Authentication]
        );
        // Outer stage still decorated the rejection.
        assert_eq!(response.headers().get("x-visited").unwrap(), "cors");
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_seen_by_outer_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::builder()
            .stage(recorder(StageKind::Cors, &log, false))
            .stage(Panicker)
            .build()
            .unwrap();

        let response = chain.execute(ctx()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get("x-visited").unwrap(), "cors");
    }
}
