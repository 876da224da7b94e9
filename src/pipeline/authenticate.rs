//! Authentication decision stage.
//!
//! # Responsibilities
//! - Decide per route whether a validated credential is required
//! - Extract the credential, validate it under a deadline, check scopes
//! - Attach the resulting `Identity` to the request context
//!
//! # Design Decisions
//! - The route is looked up in the request's own table snapshot, so the
//!   decision and the dispatch always agree on the route
//! - Unmatched requests pass through; the dispatcher answers 404/405 without
//!   contacting anything
//! - A validator that overruns its deadline counts as `Unavailable`

use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use futures_util::future::{BoxFuture, FutureExt};

use crate::auth::{CredentialExtractor, Rejection, TokenValidator};
use crate::error::{AuthError, GatewayError};
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{short_circuit, Next, Stage, StageKind};

pub struct AuthenticationStage {
    extractor: CredentialExtractor,
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
}

impl AuthenticationStage {
    pub fn new(extractor: CredentialExtractor, validator: Arc<dyn TokenValidator>, timeout: Duration) -> Self {
        Self {
            extractor,
            validator,
            timeout,
        }
    }

    fn reject(ctx: &RequestContext, reason: Rejection) -> Response {
        short_circuit(
            StageKind::Authentication,
            ctx,
            GatewayError::from(AuthError::Rejected(reason)),
        )
    }
}

impl Stage for AuthenticationStage {
    fn kind(&self) -> StageKind {
        StageKind::Authentication
    }

    fn handle<'a>(&'a self, mut ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let routes = ctx.routes().clone();
            let Some(found) = routes.match_route(ctx.method(), ctx.path()) else {
                return next.run(ctx).await;
            };
            let route = found.route();
            if !route.auth_required() {
                return next.run(ctx).await;
            }

            let credential = match self.extractor.extract(ctx.headers()) {
                Ok(credential) => credential,
                Err(reason) => return Self::reject(&ctx, reason),
            };

            let validated = tokio::time::timeout(self.timeout, self.validator.validate(&credential)).await;
            let identity = match validated {
                Ok(Ok(identity)) => identity,
                Ok(Err(reason)) => return Self::reject(&ctx, reason),
                Err(_) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        validator = self.validator.name(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Token validation timed out"
                    );
                    return Self::reject(&ctx, Rejection::Unavailable);
                }
            };

            if let Some(missing) = route
                .required_scopes()
                .iter()
                .find(|scope| !identity.has_scope(scope))
            {
                return short_circuit(
                    StageKind::Authentication,
                    &ctx,
                    GatewayError::from(AuthError::InsufficientScope(missing.clone())),
                );
            }

            tracing::debug!(
                request_id = %ctx.request_id(),
                route = %route.name(),
                subject = %identity.subject,
                "Request authenticated"
            );
            ctx.annotate(identity);
            next.run(ctx).await
        }
        .boxed()
    }
}
