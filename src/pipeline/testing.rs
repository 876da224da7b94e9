//! Helpers for exercising a single stage in front of a stub dispatcher.

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::auth::Identity;
use crate::pipeline::chain::Chain;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{Next, Stage, StageKind};
use crate::routing::RouteTable;

/// What the stub dispatcher saw, if it was reached at all.
#[derive(Debug, Clone)]
pub struct Seen {
    pub headers: HeaderMap,
    pub path: String,
    pub identity: Option<Identity>,
}

#[derive(Clone)]
pub struct Terminal {
    status: StatusCode,
    seen: Arc<Mutex<Option<Seen>>>,
}

impl Terminal {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            seen: Arc::new(Mutex::new(None)),
        }
    }

    pub fn seen(&self) -> Option<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Stage for Terminal {
    fn kind(&self) -> StageKind {
        StageKind::Dispatch
    }

    fn handle<'a>(&'a self, ctx: RequestContext, _next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            *self.seen.lock().unwrap() = Some(Seen {
                headers: ctx.headers().clone(),
                path: ctx.path().to_string(),
                identity: ctx.annotation::<Identity>().cloned(),
            });
            self.status.into_response()
        }
        .boxed()
    }
}

/// Run `stage` in front of a 200 terminal.
pub async fn run_stage<S: Stage + 'static>(stage: S, request: Request<Body>) -> (Response, Option<Seen>) {
    run_stage_with_routes(stage, request, RouteTable::default()).await
}

pub async fn run_stage_with_routes<S: Stage + 'static>(
    stage: S,
    request: Request<Body>,
    routes: RouteTable,
) -> (Response, Option<Seen>) {
    let terminal = Terminal::new(StatusCode::OK);
    let chain = Chain::builder()
        .stage(stage)
        .stage(terminal.clone())
        .build()
        .unwrap();
    let ctx = RequestContext::new(request, Arc::new(routes), CancellationToken::new());
    let response = chain.execute(ctx).await;
    (response, terminal.seen())
}
