use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub route_generation: u64,
    pub routes: usize,
}

#[derive(Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub methods: Vec<String>,
    pub upstream: String,
    pub downstream: String,
    pub timeout_ms: u64,
    pub auth_required: bool,
    pub required_scopes: Vec<String>,
    pub retries: u32,
}

#[derive(Serialize)]
pub struct RouteListing {
    pub generation: u64,
    pub routes: Vec<RouteSummary>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let table = state.store.table();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        route_generation: table.generation(),
        routes: table.len(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<RouteListing> {
    let table = state.store.table();
    let routes = table
        .routes()
        .iter()
        .map(|route| RouteSummary {
            name: route.name().to_string(),
            methods: route.methods().names(),
            upstream: route.upstream().to_string(),
            downstream: format!(
                "{}://{}{}",
                route.downstream_scheme(),
                route.downstream_host(),
                route.downstream_template()
            ),
            timeout_ms: route.timeout().as_millis() as u64,
            auth_required: route.auth_required(),
            required_scopes: route.required_scopes().to_vec(),
            retries: route.retries(),
        })
        .collect();

    Json(RouteListing {
        generation: table.generation(),
        routes,
    })
}
