//! Admin API.
//!
//! Served on its own bind address, never on the gateway listener, behind a
//! bearer API key.
//!
//! - `GET /admin/status`: version, uptime, active route table generation
//! - `GET /admin/routes`: the active route table

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};

use crate::config::schema::AdminConfig;
use crate::pipeline::Chain;
use crate::routing::RouteStore;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routes, get_status};

#[derive(Clone)]
pub struct AdminState {
    pub(crate) store: Arc<RouteStore<Chain>>,
    pub(crate) api_key: Arc<str>,
    pub(crate) started_at: Instant,
}

impl AdminState {
    pub fn new(store: Arc<RouteStore<Chain>>, config: &AdminConfig, started_at: Instant) -> Self {
        Self {
            store,
            api_key: Arc::from(config.api_key.as_str()),
            started_at,
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
