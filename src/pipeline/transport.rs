//! Transport security enforcement.
//!
//! # Responsibilities
//! - Detect whether the request arrived over a secure transport
//! - Redirect or reject plain-HTTP requests before any credential is read
//! - Add `Strict-Transport-Security` to secure responses when configured
//!
//! # Design Decisions
//! - `X-Forwarded-Proto` is only honored when explicitly trusted
//! - Redirects use 307 so the method and body are preserved

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::schema::{TransportConfig, TransportMode};
use crate::error::GatewayError;
use crate::http::request::Transport;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{short_circuit, Next, Stage, StageKind};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Context annotation: the request arrived over a secure transport.
#[derive(Debug, Clone, Copy)]
pub struct SecureTransport;

#[derive(Debug, Clone)]
pub struct TransportStage {
    mode: TransportMode,
    https_port: Option<u16>,
    trust_forwarded_proto: bool,
    hsts: Option<HeaderValue>,
}

impl TransportStage {
    pub fn from_config(config: &TransportConfig) -> Self {
        let hsts = config.hsts_max_age_secs.and_then(|secs| {
            HeaderValue::from_str(&format!("max-age={}; includeSubDomains", secs)).ok()
        });
        Self {
            mode: config.mode,
            https_port: config.https_port,
            trust_forwarded_proto: config.trust_forwarded_proto,
            hsts,
        }
    }

    fn is_secure(&self, ctx: &RequestContext) -> bool {
        if ctx.transport() == Transport::Tls {
            return true;
        }
        self.trust_forwarded_proto
            && ctx
                .headers()
                .get(X_FORWARDED_PROTO)
                .and_then(|v| v.to_str().ok())
                .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
                .unwrap_or(false)
    }

    fn redirect(&self, ctx: &RequestContext) -> Response {
        let host = ctx
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| ctx.request().uri().host().map(str::to_string));
        let Some(host) = host else {
            return short_circuit(
                StageKind::Transport,
                ctx,
                GatewayError::bad_request("cannot redirect a request without a Host header"),
            );
        };

        let hostname = strip_port(&host);
        let authority = match self.https_port {
            Some(443) | None => hostname.to_string(),
            Some(port) => format!("{}:{}", hostname, port),
        };
        let path_and_query = ctx
            .request()
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let location = format!("https://{}{}", authority, path_and_query);

        match HeaderValue::from_str(&location) {
            Ok(location) => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    location = ?location,
                    "Redirecting plain-HTTP request"
                );
                metrics::record_short_circuit(StageKind::Transport.as_str(), 307);
                (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, location)],
                )
                    .into_response()
            }
            Err(_) => short_circuit(
                StageKind::Transport,
                ctx,
                GatewayError::bad_request("Host header cannot form a redirect target"),
            ),
        }
    }
}

/// Drop a trailing `:port`, keeping bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

impl Stage for TransportStage {
    fn kind(&self) -> StageKind {
        StageKind::Transport
    }

    fn handle<'a>(&'a self, mut ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let secure = self.is_secure(&ctx);
            if secure {
                ctx.annotate(SecureTransport);
            } else {
                match self.mode {
                    TransportMode::Off => {}
                    TransportMode::Redirect => return self.redirect(&ctx),
                    TransportMode::Reject => {
                        return short_circuit(
                            StageKind::Transport,
                            &ctx,
                            GatewayError::client(StatusCode::FORBIDDEN, "HTTPS is required"),
                        )
                    }
                }
            }

            let mut response = next.run(ctx).await;
            if secure {
                if let Some(hsts) = &self.hsts {
                    response
                        .headers_mut()
                        .insert(header::STRICT_TRANSPORT_SECURITY, hsts.clone());
                }
            }
            response
        }
        .boxed()
    }
}
