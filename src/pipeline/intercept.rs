//! Request interception.
//!
//! # Responsibilities
//! - Run pre-authentication hooks that may inspect, mutate, annotate or
//!   terminate a request
//! - Bound all interceptor work by a single deadline
//! - Guarantee interceptors run at most once per request context
//!
//! # Design Decisions
//! - Interceptors run before validation so they can remove headers that
//!   validation or routing would otherwise trust
//! - Interceptors report failures as `GatewayError`; the stage converts them
//! - A deadline overrun is an internal error, never a silent pass

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderName, HeaderValue},
    response::Response,
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::schema::InterceptorConfig;
use crate::error::{ConfigurationError, GatewayError};
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::stage::{short_circuit, Next, Stage, StageKind};

/// Outcome of one interceptor.
pub enum Verdict {
    /// Keep going; any mutation was applied to the context in place.
    Continue,
    ShortCircuit(Response),
}

impl std::fmt::Debug for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Continue => f.write_str("Continue"),
            Verdict::ShortCircuit(r) => write!(f, "ShortCircuit({})", r.status()),
        }
    }
}

pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<Verdict, GatewayError>>;
}

/// Context marker: interceptors already ran for this request.
#[derive(Debug, Clone, Copy)]
struct Intercepted;

pub struct InterceptorStage {
    interceptors: Vec<Arc<dyn Interceptor>>,
    timeout: Duration,
}

impl InterceptorStage {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interceptors: Vec::new(),
            timeout,
        }
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    async fn run_all(&self, ctx: &mut RequestContext) -> Result<Option<Response>, GatewayError> {
        for interceptor in &self.interceptors {
            match interceptor.intercept(ctx).await? {
                Verdict::Continue => {}
                Verdict::ShortCircuit(response) => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        interceptor = interceptor.name(),
                        status = response.status().as_u16(),
                        "Interceptor short-circuited request"
                    );
                    metrics::record_short_circuit(
                        StageKind::Interception.as_str(),
                        response.status().as_u16(),
                    );
                    return Ok(Some(response));
                }
            }
        }
        Ok(None)
    }
}

impl Stage for InterceptorStage {
    fn kind(&self) -> StageKind {
        StageKind::Interception
    }

    fn handle<'a>(&'a self, mut ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            if ctx.annotation::<Intercepted>().is_some() {
                return next.run(ctx).await;
            }

            let outcome = tokio::time::timeout(self.timeout, self.run_all(&mut ctx)).await;
            match outcome {
                Ok(Ok(None)) => {
                    ctx.annotate(Intercepted);
                    next.run(ctx).await
                }
                Ok(Ok(Some(response))) => response,
                Ok(Err(e)) => short_circuit(StageKind::Interception, &ctx, e),
                Err(_) => short_circuit(
                    StageKind::Interception,
                    &ctx,
                    GatewayError::internal(format!(
                        "interceptors exceeded {}ms",
                        self.timeout.as_millis()
                    )),
                ),
            }
        }
        .boxed()
    }
}

/// Default interceptor: structural request checks plus header hygiene.
#[derive(Debug, Clone)]
pub struct HeaderPolicyInterceptor {
    max_header_count: usize,
    reject_path_traversal: bool,
    strip: Vec<HeaderName>,
    set: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderPolicyInterceptor {
    /// `identity_header` is always stripped so clients cannot forge it.
    pub fn from_config(
        config: &InterceptorConfig,
        identity_header: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        let mut strip = Vec::new();
        for name in config.strip_headers.iter().map(String::as_str).chain(identity_header) {
            let name = HeaderName::try_from(name)
                .map_err(|_| ConfigurationError::invalid("interceptor.strip_headers", format!("invalid header `{}`", name)))?;
            if !strip.contains(&name) {
                strip.push(name);
            }
        }

        let mut set = Vec::new();
        for (name, value) in &config.set_headers {
            let header = HeaderName::try_from(name.as_str())
                .map_err(|_| ConfigurationError::invalid("interceptor.set_headers", format!("invalid header `{}`", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigurationError::invalid("interceptor.set_headers", format!("invalid value for `{}`", name)))?;
            set.push((header, value));
        }

        Ok(Self {
            max_header_count: config.max_header_count,
            reject_path_traversal: config.reject_path_traversal,
            strip,
            set,
        })
    }

    fn check(&self, ctx: &RequestContext) -> Result<(), GatewayError> {
        if self.reject_path_traversal && has_traversal(ctx.path()) {
            return Err(GatewayError::bad_request(
                "path traversal and encoded separators are not allowed",
            ));
        }
        if ctx.headers().len() > self.max_header_count {
            return Err(GatewayError::bad_request(format!(
                "too many headers (limit {})",
                self.max_header_count
            )));
        }
        Ok(())
    }
}

/// Dot-dot segments in any spelling, or a `/` or `\` hidden by percent-encoding.
fn has_traversal(path: &str) -> bool {
    path.split('/').any(|segment| {
        let lower = segment.to_ascii_lowercase();
        lower.contains("%2f")
            || lower.contains("%5c")
            || segment.contains('\\')
            || lower.replace("%2e", ".") == ".."
    })
}

impl Interceptor for HeaderPolicyInterceptor {
    fn name(&self) -> &'static str {
        "header_policy"
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<Verdict, GatewayError>> {
        async move {
            self.check(ctx)?;

            let headers = ctx.headers_mut();
            for name in &self.strip {
                headers.remove(name);
            }
            for (name, value) in &self.set {
                headers.insert(name.clone(), value.clone());
            }
            Ok(Verdict::Continue)
        }
        .boxed()
    }
}
