//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router whose only handler runs the stage chain
//! - Wire up outer layers (tracing, request ID, timeout, body and in-flight limits)
//! - Serve the plain listener, the optional TLS listener and the admin API
//! - Apply validated config reloads: rebuild the chain, swap routes
//!
//! # Design Decisions
//! - The route table and the chain built from the same config are published
//!   as one snapshot; each request loads it once, up front
//! - The chain runs in its own task; dropping the handler (client gone)
//!   cancels the request's token so the downstream call is abandoned
//! - The token validator is built once; reloads rotate its keys in place

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Extension, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{setup_admin_router, AdminState};
use crate::auth::{build_validator, CredentialExtractor, TokenValidator};
use crate::config::loader::ConfigError;
use crate::config::schema::{AuthMode, GatewayConfig};
use crate::config::validation::validate_config;
use crate::dispatch::{build_client, Dispatcher, HttpClient};
use crate::error::{ConfigurationError, GatewayError};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, Transport};
use crate::net::load_tls_config;
use crate::observability::metrics;
use crate::pipeline::{
    AuthenticationStage, Chain, CorsStage, HeaderPolicyInterceptor, InterceptorStage,
    RequestContext, TransportStage,
};
use crate::routing::RouteStore;
use crate::security::headers::ForwardPolicy;
use crate::security::limits::{body_limit_layer, in_flight_limit_layer};

const TLS_DRAIN: Duration = Duration::from_secs(30);

/// Application state injected into the gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    store: Arc<RouteStore<Chain>>,
}

impl GatewayState {
    pub fn store(&self) -> &Arc<RouteStore<Chain>> {
        &self.store
    }
}

/// Assemble the stage chain for `config`.
///
/// Order: CORS (when enabled), transport, interceptors, authentication, dispatch.
pub fn build_chain(
    config: &GatewayConfig,
    client: HttpClient,
    validator: Arc<dyn TokenValidator>,
) -> Result<Chain, ConfigurationError> {
    let mut builder = Chain::builder();
    if config.cors.enabled {
        builder = builder.stage(CorsStage::from_config(&config.cors)?);
    }

    let interceptors = InterceptorStage::new(Duration::from_millis(config.interceptor.timeout_ms)).with(
        HeaderPolicyInterceptor::from_config(&config.interceptor, config.auth.identity_header.as_deref())?,
    );
    let authentication = AuthenticationStage::new(
        CredentialExtractor::from_config(&config.auth)?,
        validator,
        Duration::from_millis(config.auth.timeout_ms),
    );
    let dispatcher = Dispatcher::new(
        client,
        ForwardPolicy::from_config(&config.auth)?,
        config.retries.clone(),
        config.security.max_body_size,
    );

    builder
        .stage(TransportStage::from_config(&config.transport))
        .stage(interceptors)
        .stage(authentication)
        .stage(dispatcher)
        .build()
}

/// Applies reloaded configurations to the running gateway.
struct Reloader {
    state: GatewayState,
    client: HttpClient,
    validator: Arc<dyn TokenValidator>,
    auth_mode: AuthMode,
}

impl Reloader {
    /// Validate everything first; publish routes and chain together only if
    /// all of it holds.
    fn apply(&self, config: &GatewayConfig) -> Result<u64, Vec<ConfigurationError>> {
        validate_config(config)?;
        if config.auth.mode != self.auth_mode {
            return Err(vec![ConfigurationError::invalid(
                "auth.mode",
                "changing the validator requires a restart",
            )]);
        }

        let chain =
            build_chain(config, self.client.clone(), self.validator.clone()).map_err(|e| vec![e])?;
        self.validator.reconfigure(&config.auth).map_err(|e| vec![e])?;

        self.state.store.reload(&config.routes, chain)
    }

    fn apply_logged(&self, config: &GatewayConfig) {
        match self.apply(config) {
            Ok(generation) => tracing::info!(
                generation,
                routes = config.routes.len(),
                "Gateway configuration applied"
            ),
            Err(errors) => {
                metrics::record_route_reload(false);
                for error in &errors {
                    tracing::error!(%error, "Rejected configuration reload");
                }
            }
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    config: GatewayConfig,
    state: GatewayState,
    reloader: Arc<Reloader>,
    in_flight: GlobalConcurrencyLimitLayer,
    started_at: Instant,
}

impl HttpServer {
    /// Validate `config` and build every component. Nothing is bound yet.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let client = build_client(&config.timeouts);
        let validator = build_validator(&config.auth, client.clone())
            .map_err(|e| ConfigError::Validation(vec![e]))?;
        let chain = build_chain(&config, client.clone(), validator.clone())
            .map_err(|e| ConfigError::Validation(vec![e]))?;

        tracing::info!(
            routes = config.routes.len(),
            stages = ?chain.kinds(),
            validator = validator.name(),
            "Gateway initialized"
        );

        let store = RouteStore::from_configs(&config.routes, chain).map_err(ConfigError::Validation)?;
        let state = GatewayState {
            store: Arc::new(store),
        };
        let reloader = Arc::new(Reloader {
            state: state.clone(),
            client,
            validator,
            auth_mode: config.auth.mode,
        });

        Ok(Self {
            in_flight: in_flight_limit_layer(&config.listener),
            config,
            state,
            reloader,
            started_at: Instant::now(),
        })
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Get a reference to the config the server was started with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, transport: Transport) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(self.state.clone())
            .layer(Extension(transport))
            .layer(self.in_flight.clone())
            .layer(body_limit_layer(&self.config.security))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` are applied while running; a
    /// closed update channel just means no further reloads.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let stop = CancellationToken::new();
        {
            let stop = stop.clone();
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                stop.cancel();
            });
        }

        {
            let reloader = self.reloader.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = config_updates.recv() => match update {
                            Some(config) => reloader.apply_logged(&config),
                            None => break,
                        },
                        _ = stop.cancelled() => break,
                    }
                }
            });
        }

        if let Some(tls) = &self.config.listener.tls {
            let rustls = load_tls_config(tls).await?;
            let tls_addr: SocketAddr = tls
                .bind_address
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let app = self.build_router(Transport::Tls);

            let handle = axum_server::Handle::new();
            let draining = handle.clone();
            let stop_tls = stop.clone();
            tokio::spawn(async move {
                stop_tls.cancelled().await;
                draining.graceful_shutdown(Some(TLS_DRAIN));
            });

            tracing::info!(address = %tls_addr, "HTTPS listener starting");
            tokio::spawn(async move {
                let served = axum_server::bind_rustls(tls_addr, rustls)
                    .handle(handle)
                    .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "HTTPS listener failed");
                }
            });
        }

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let admin = setup_admin_router(AdminState::new(
                self.state.store.clone(),
                &self.config.admin,
                self.started_at,
            ));
            let stop_admin = stop.clone();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, admin)
                    .with_graceful_shutdown(stop_admin.cancelled_owned())
                    .await
                {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let app = self
            .build_router(Transport::Plain)
            .into_make_service_with_connect_info::<SocketAddr>();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(stop.clone().cancelled_owned())
            .await;
        stop.cancel();
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Run one request through the current chain against the route table it was
/// published with.
async fn gateway_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let cancellation = CancellationToken::new();
    let _disconnect = cancellation.clone().drop_guard();

    let snapshot = state.store.snapshot();
    let ctx = RequestContext::new(request, snapshot.table().clone(), cancellation);
    let request_id = ctx.request_id().to_string();

    match tokio::spawn(async move { snapshot.handler().execute(ctx).await }).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Request task failed");
            GatewayError::internal("request handling failed").into_response_for(&request_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::pipeline::StageKind;

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt.secret = Some("test-secret".into());
        config.routes.push(RouteConfig::new(
            "users",
            &["GET"],
            "/api/users/{id}",
            "127.0.0.1:9",
            "/users/{id}",
        ));
        config
    }

    #[test]
    fn chain_follows_fixed_order() {
        let config = config();
        let client = build_client(&config.timeouts);
        let validator = build_validator(&config.auth, client.clone()).unwrap();

        let chain = build_chain(&config, client.clone(), validator.clone()).unwrap();
        assert_eq!(
            chain.kinds(),
            vec![
                StageKind::Cors,
                StageKind::Transport,
                StageKind::Interception,
                StageKind::Authentication,
                StageKind::Dispatch,
            ]
        );

        let mut without_cors = config;
        without_cors.cors.enabled = false;
        let chain = build_chain(&without_cors, client, validator).unwrap();
        assert_eq!(chain.kinds().first(), Some(&StageKind::Transport));
    }

    #[test]
    fn rejected_reload_keeps_the_active_generation() {
        let server = HttpServer::new(config()).unwrap();
        let generation = server.state().store().generation();

        let mut bad = config();
        bad.routes[0].downstream_path = "/users/{missing}".into();
        assert!(server.reloader.apply(&bad).is_err());
        assert_eq!(server.state().store().generation(), generation);

        let mut mode_change = config();
        mode_change.auth.mode = AuthMode::Introspection;
        mode_change.auth.introspection.url = "http://idp.internal/introspect".into();
        assert!(server.reloader.apply(&mode_change).is_err());

        let mut good = config();
        good.routes.push(RouteConfig::new("orders", &[], "/api/orders", "127.0.0.1:9", "/orders"));
        let next = server.reloader.apply(&good).unwrap();
        assert!(next > generation);
        let published = server.state().store().snapshot();
        assert_eq!(published.table().len(), 2);
        assert_eq!(published.table().generation(), next);
    }

    #[test]
    fn reload_publishes_chain_with_its_table() {
        let server = HttpServer::new(config()).unwrap();
        let before = server.state().store().snapshot();

        let mut next = config();
        next.cors.enabled = false;
        let generation = server.reloader.apply(&next).unwrap();

        let published = server.state().store().snapshot();
        assert_eq!(published.table().generation(), generation);
        assert_eq!(published.handler().kinds().first(), Some(&StageKind::Transport));
        assert_eq!(before.handler().kinds().first(), Some(&StageKind::Cors));
    }

    #[test]
    fn invalid_startup_config_is_reported() {
        let mut bad = config();
        bad.auth.jwt.secret = None;
        assert!(matches!(HttpServer::new(bad), Err(ConfigError::Validation(_))));
    }
}
