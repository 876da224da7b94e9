//! Per-request scratch state carried through the chain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, Method, Request},
};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::http::request::{RequestId, Transport};
use crate::routing::{RouteMatch, RouteTable};

/// Everything a stage may look at or change for one request.
///
/// Owned by the request's handling task; never shared across requests.
#[derive(Debug)]
pub struct RequestContext {
    request: Request<Body>,
    annotations: Extensions,
    routes: Arc<RouteTable>,
    route: Option<RouteMatch>,
    request_id: String,
    transport: Transport,
    client_addr: Option<SocketAddr>,
    started_at: Instant,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Wrap an inbound request together with the route table snapshot it
    /// will be served from.
    pub fn new(request: Request<Body>, routes: Arc<RouteTable>, cancellation: CancellationToken) -> Self {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let transport = request
            .extensions()
            .get::<Transport>()
            .copied()
            .unwrap_or_default();
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        Self {
            request,
            annotations: Extensions::new(),
            routes,
            route: None,
            request_id,
            transport,
            client_addr,
            started_at: Instant::now(),
            cancellation,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    /// Take the body out for forwarding; leaves an empty body behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(self.request.body_mut())
    }

    /// Attach a typed annotation, replacing any previous one of that type.
    pub fn annotate<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.annotations.insert(value)
    }

    pub fn annotation<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.annotations.get::<T>()
    }

    /// Table snapshot taken when the request entered the gateway.
    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    /// Record the chosen route. The route is chosen once per request.
    pub fn set_route(&mut self, route: RouteMatch) -> Result<(), GatewayError> {
        if self.route.is_some() {
            return Err(GatewayError::internal("route already chosen for this request"));
        }
        self.route = Some(route);
        Ok(())
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Cancelled when the inbound client goes away.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
