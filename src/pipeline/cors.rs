//! CORS policy stage.
//!
//! # Responsibilities
//! - Answer preflight requests (`OPTIONS` + `Origin` +
//!   `Access-Control-Request-Method`) without touching the rest of the chain
//! - Decorate every other response for an allowed origin, including responses
//!   produced by inner stages that rejected the request
//!
//! # Design Decisions
//! - Outermost stage: it must see the response of every short-circuit
//! - Requests without an `Origin` header pass through untouched
//! - With credentials enabled the origin is echoed instead of `*`, so a
//!   wildcard origin list with credentials is refused at load time

use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::schema::CorsConfig;
use crate::error::{ConfigurationError, GatewayError};
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{short_circuit, Next, Stage, StageKind};

#[derive(Debug, Clone)]
enum AllowList {
    Any,
    Only(Vec<String>),
}

impl AllowList {
    fn from_config(values: &[String], normalize: fn(&str) -> String) -> Self {
        if values.iter().any(|v| v == "*") {
            AllowList::Any
        } else {
            AllowList::Only(values.iter().map(|v| normalize(v.trim())).collect())
        }
    }

    fn allows(&self, value: &str) -> bool {
        match self {
            AllowList::Any => true,
            AllowList::Only(values) => values.iter().any(|v| v == value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsStage {
    origins: AllowList,
    methods: AllowList,
    headers: AllowList,
    allowed_methods: Option<HeaderValue>,
    allowed_headers: Option<HeaderValue>,
    exposed_headers: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: Option<HeaderValue>,
}

impl CorsStage {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ConfigurationError> {
        let origins = AllowList::from_config(&config.allowed_origins, |o| o.to_string());
        if config.allow_credentials && matches!(origins, AllowList::Any) {
            return Err(ConfigurationError::invalid(
                "cors.allowed_origins",
                "`*` cannot be combined with allow_credentials; list the origins explicitly",
            ));
        }

        let methods = AllowList::from_config(&config.allowed_methods, |m| m.to_ascii_uppercase());
        let headers = AllowList::from_config(&config.allowed_headers, |h| h.to_ascii_lowercase());

        let allowed_methods = match &methods {
            AllowList::Any => None,
            AllowList::Only(list) => Some(join_header("cors.allowed_methods", list)?),
        };
        let allowed_headers = match &headers {
            AllowList::Any => None,
            AllowList::Only(list) => Some(join_header("cors.allowed_headers", list)?),
        };
        let exposed_headers = if config.exposed_headers.is_empty() {
            None
        } else {
            Some(join_header("cors.exposed_headers", &config.exposed_headers)?)
        };

        Ok(Self {
            origins,
            methods,
            headers,
            allowed_methods,
            allowed_headers,
            exposed_headers,
            allow_credentials: config.allow_credentials,
            max_age: config.max_age_secs.map(HeaderValue::from),
        })
    }

    fn is_preflight(ctx: &RequestContext) -> bool {
        ctx.method() == Method::OPTIONS
            && ctx.headers().contains_key(header::ORIGIN)
            && ctx.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn preflight(&self, ctx: &RequestContext, origin: &HeaderValue) -> Response {
        let requested_method = ctx
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .cloned();
        let method_allowed = requested_method
            .as_ref()
            .and_then(|m| m.to_str().ok())
            .map(|m| self.methods.allows(&m.to_ascii_uppercase()))
            .unwrap_or(false);
        if !method_allowed {
            return short_circuit(
                StageKind::Cors,
                ctx,
                GatewayError::client(StatusCode::FORBIDDEN, "CORS method not allowed"),
            );
        }

        let requested_headers = ctx
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();
        if let Some(list) = requested_headers.as_ref().and_then(|h| h.to_str().ok()) {
            let denied = list
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .find(|h| !self.headers.allows(h));
            if let Some(denied) = denied {
                return short_circuit(
                    StageKind::Cors,
                    ctx,
                    GatewayError::client(
                        StatusCode::FORBIDDEN,
                        format!("CORS header `{}` not allowed", denied),
                    ),
                );
            }
        }

        let mut response = StatusCode::NO_CONTENT.into_response();
        let out = response.headers_mut();
        self.apply_origin(out, origin);

        let methods = self.allowed_methods.clone().or(requested_method);
        if let Some(methods) = methods {
            out.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        let headers = self.allowed_headers.clone().or(requested_headers);
        if let Some(headers) = headers {
            out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, headers);
        }
        if let Some(max_age) = &self.max_age {
            out.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }

        tracing::debug!(request_id = %ctx.request_id(), "CORS preflight answered");
        response
    }

    fn apply_origin(&self, out: &mut HeaderMap, origin: &HeaderValue) {
        let echo = self.allow_credentials || matches!(self.origins, AllowList::Only(_));
        if echo {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            out.append(header::VARY, HeaderValue::from_static("origin"));
        } else {
            out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        if self.allow_credentials {
            out.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

impl Stage for CorsStage {
    fn kind(&self) -> StageKind {
        StageKind::Cors
    }

    fn handle<'a>(&'a self, ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let origin = ctx
                .headers()
                .get(header::ORIGIN)
                .filter(|o| o.to_str().map(|o| self.origins.allows(o)).unwrap_or(false))
                .cloned();

            let Some(origin) = origin else {
                if Self::is_preflight(&ctx) {
                    return short_circuit(
                        StageKind::Cors,
                        &ctx,
                        GatewayError::client(StatusCode::FORBIDDEN, "CORS origin not allowed"),
                    );
                }
                return next.run(ctx).await;
            };

            if Self::is_preflight(&ctx) {
                return self.preflight(&ctx, &origin);
            }

            let mut response = next.run(ctx).await;
            let out = response.headers_mut();
            self.apply_origin(out, &origin);
            if let Some(exposed) = &self.exposed_headers {
                out.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
            }
            response
        }
        .boxed()
    }
}

fn join_header(field: &str, values: &[String]) -> Result<HeaderValue, ConfigurationError> {
    HeaderValue::from_str(&values.join(", "))
        .map_err(|_| ConfigurationError::invalid(field, "contains characters not valid in a header"))
}
