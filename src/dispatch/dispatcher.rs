//! Route dispatcher: the innermost stage.
//!
//! # Responsibilities
//! - Match the request against the context's table snapshot (404 / 405)
//! - Build the downstream URI from the route's template and bound segments
//! - Forward headers per policy and the body (streamed or buffered)
//! - Enforce the route deadline across attempts and backoff sleeps
//! - Retry idempotent requests when the route allows it
//! - Stream the downstream response back verbatim minus hop-by-hop headers
//!
//! # Design Decisions
//! - The body is buffered only when a retry is possible; otherwise it streams
//! - The deadline bounds the wait for response headers; the body then streams
//! - Client disconnect cancels the in-flight attempt and reports 499

use std::str::FromStr;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    response::Response,
};
use futures_util::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::auth::Identity;
use crate::config::schema::RetryConfig;
use crate::dispatch::client::HttpClient;
use crate::error::{GatewayError, UpstreamError};
use crate::http::request::Transport;
use crate::http::response::from_downstream;
use crate::observability::metrics;
use crate::pipeline::{short_circuit, Next, RequestContext, SecureTransport, Stage, StageKind};
use crate::resilience::{Deadline, RetryPolicy};
use crate::routing::{Lookup, Route, RouteMatch};
use crate::security::headers::{ForwardPolicy, Forwarded};

pub struct Dispatcher {
    client: HttpClient,
    forward: ForwardPolicy,
    backoff: RetryConfig,
    max_body_size: usize,
}

/// Request body for one or more attempts.
enum Payload {
    Buffered(Bytes),
    Streaming(Option<Body>),
}

impl Payload {
    fn next_body(&mut self) -> Body {
        match self {
            Payload::Buffered(bytes) => Body::from(bytes.clone()),
            Payload::Streaming(body) => body.take().unwrap_or_else(Body::empty),
        }
    }
}

/// Everything needed to issue attempts, detached from the context.
/// The body travels separately as a `Payload`.
struct Exchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    policy: RetryPolicy,
    deadline: Deadline,
    cancellation: CancellationToken,
    request_id: String,
}

impl Dispatcher {
    pub fn new(client: HttpClient, forward: ForwardPolicy, backoff: RetryConfig, max_body_size: usize) -> Self {
        Self {
            client,
            forward,
            backoff,
            max_body_size,
        }
    }

    async fn dispatch(&self, mut ctx: RequestContext) -> Response {
        let method = ctx.method().clone();
        let found = match ctx.routes().lookup(&method, ctx.path()) {
            Lookup::Matched(found) => found,
            Lookup::MethodNotAllowed(allowed) => {
                metrics::record_request("none", method.as_str(), 405, ctx.started_at());
                let mut response = short_circuit(
                    StageKind::Dispatch,
                    &ctx,
                    GatewayError::client(
                        StatusCode::METHOD_NOT_ALLOWED,
                        format!("method {} not allowed for {}", method, ctx.path()),
                    ),
                );
                if let Ok(allow) = HeaderValue::from_str(&allowed.join(", ")) {
                    response.headers_mut().insert(header::ALLOW, allow);
                }
                return response;
            }
            Lookup::NotFound => {
                metrics::record_request("none", method.as_str(), 404, ctx.started_at());
                let message = format!("no route for {} {}", method, ctx.path());
                return short_circuit(StageKind::Dispatch, &ctx, GatewayError::not_found(message));
            }
        };

        if let Err(e) = ctx.set_route(found.clone()) {
            return short_circuit(StageKind::Dispatch, &ctx, e);
        }
        let route = found.route().clone();

        tracing::debug!(
            request_id = %ctx.request_id(),
            route = %route.name(),
            generation = ctx.routes().generation(),
            "Route matched"
        );

        let response = match self.prepare(&mut ctx, &found).await {
            Ok((exchange, payload)) => match self.execute(&route, exchange, payload).await {
                Ok(response) => response,
                Err(e) => self.fail(&ctx, &route, e),
            },
            Err(e) => self.fail(&ctx, &route, e),
        };

        metrics::record_request(route.name(), method.as_str(), response.status().as_u16(), ctx.started_at());
        response
    }

    fn fail(&self, ctx: &RequestContext, route: &Route, error: GatewayError) -> Response {
        if let GatewayError::Upstream(upstream) = &error {
            let kind = match upstream {
                UpstreamError::Timeout { .. } => "timeout",
                UpstreamError::Connect(_) => "connect",
                UpstreamError::InvalidRequest(_) => "invalid_request",
                UpstreamError::Cancelled => "cancelled",
            };
            metrics::record_upstream_error(route.name(), kind);
        }
        tracing::warn!(
            request_id = %ctx.request_id(),
            route = %route.name(),
            status = error.status().as_u16(),
            error = %error,
            "Dispatch failed"
        );
        error.into_response_for(ctx.request_id())
    }

    /// Detach what the attempts need from the context.
    async fn prepare(
        &self,
        ctx: &mut RequestContext,
        found: &RouteMatch,
    ) -> Result<(Exchange, Payload), GatewayError> {
        let route = found.route();
        let uri = downstream_uri(route, &found.downstream_path(), ctx.request().uri().query())?;

        let mut headers = ctx.headers().clone();
        let hop = Forwarded {
            client_addr: ctx.client_addr(),
            transport: if ctx.annotation::<SecureTransport>().is_some() {
                Transport::Tls
            } else {
                ctx.transport()
            },
            request_id: ctx.request_id(),
        };
        self.forward
            .apply(&mut headers, route, ctx.annotation::<Identity>(), hop);

        let method = ctx.method().clone();
        let policy = RetryPolicy::new(route.retries(), &self.backoff).for_method(&method);

        let body = ctx.take_body();
        let payload = if policy.allows_retry() {
            let bytes = axum::body::to_bytes(body, self.max_body_size)
                .await
                .map_err(|_| GatewayError::client(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))?;
            // A buffered body has a known length; drop any inbound framing.
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Payload::Buffered(bytes)
        } else {
            Payload::Streaming(Some(body))
        };

        let exchange = Exchange {
            method,
            uri,
            headers,
            policy,
            deadline: Deadline::after(route.timeout()),
            cancellation: ctx.cancellation().clone(),
            request_id: ctx.request_id().to_string(),
        };
        Ok((exchange, payload))
    }

    async fn execute(
        &self,
        route: &Route,
        exchange: Exchange,
        mut payload: Payload,
    ) -> Result<Response, GatewayError> {
        let timeout_ms = exchange.deadline.budget().as_millis() as u64;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = Request::builder()
                .method(exchange.method.clone())
                .uri(exchange.uri.clone())
                .body(payload.next_body())
                .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
            *request.headers_mut() = exchange.headers.clone();

            let attempts_left = exchange.policy.max_attempts().saturating_sub(attempt) + 1;
            let attempt_budget = exchange.deadline.share(attempts_left);

            let outcome = tokio::select! {
                biased;
                _ = exchange.cancellation.cancelled() => {
                    return Err(UpstreamError::Cancelled.into());
                }
                result = tokio::time::timeout(attempt_budget, self.client.request(request)) => result,
            };

            let (status, network_error) = match outcome {
                Err(_) => {
                    tracing::warn!(
                        request_id = %exchange.request_id,
                        route = %route.name(),
                        attempt,
                        attempt_budget_ms = attempt_budget.as_millis() as u64,
                        "Downstream attempt timed out"
                    );
                    if exchange.deadline.expired()
                        || !self.retry_after(route, &exchange, attempt, None, true).await?
                    {
                        return Err(UpstreamError::Timeout { timeout_ms }.into());
                    }
                    (None, true)
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    if !self.retry_after(route, &exchange, attempt, Some(status), false).await? {
                        tracing::debug!(
                            request_id = %exchange.request_id,
                            route = %route.name(),
                            status = status.as_u16(),
                            attempt,
                            "Downstream responded"
                        );
                        return Ok(from_downstream(response));
                    }
                    (Some(status), false)
                }
                Ok(Err(e)) => {
                    let network_error = e.is_connect();
                    tracing::warn!(
                        request_id = %exchange.request_id,
                        route = %route.name(),
                        attempt,
                        error = %e,
                        "Downstream request failed"
                    );
                    if !self.retry_after(route, &exchange, attempt, None, network_error).await? {
                        return Err(UpstreamError::Connect(e.to_string()).into());
                    }
                    (None, network_error)
                }
            };

            tracing::info!(
                request_id = %exchange.request_id,
                route = %route.name(),
                attempt,
                max_attempts = exchange.policy.max_attempts(),
                status = ?status.map(|s| s.as_u16()),
                network_error,
                "Retrying downstream request"
            );
        }
    }

    /// Sleep out the backoff if another attempt is allowed and fits in the
    /// deadline. `Ok(false)` means give up with the current outcome.
    async fn retry_after(
        &self,
        route: &Route,
        exchange: &Exchange,
        attempt: u32,
        status: Option<StatusCode>,
        network_error: bool,
    ) -> Result<bool, GatewayError> {
        if !exchange
            .policy
            .should_retry(attempt, &exchange.method, status, network_error)
        {
            return Ok(false);
        }

        let delay = exchange.policy.backoff(attempt);
        if !exchange.deadline.fits(delay) {
            tracing::debug!(
                request_id = %exchange.request_id,
                route = %route.name(),
                "No time left in the deadline for another attempt"
            );
            return Ok(false);
        }

        tokio::select! {
            biased;
            _ = exchange.cancellation.cancelled() => Err(UpstreamError::Cancelled.into()),
            _ = tokio::time::sleep(delay) => Ok(true),
        }
    }
}

/// `scheme://host` + rendered path + the inbound query, verbatim.
pub fn downstream_uri(route: &Route, path: &str, query: Option<&str>) -> Result<Uri, UpstreamError> {
    let mut target = format!("{}://{}{}", route.downstream_scheme(), route.downstream_host(), path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    Uri::from_str(&target).map_err(|e| UpstreamError::InvalidRequest(format!("{}: {}", target, e)))
}

impl Stage for Dispatcher {
    fn kind(&self) -> StageKind {
        StageKind::Dispatch
    }

    fn handle<'a>(&'a self, ctx: RequestContext, _next: Next<'a>) -> BoxFuture<'a, Response> {
        self.dispatch(ctx).boxed()
    }
}
