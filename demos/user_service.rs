//! Demo downstream service for local runs of the gateway.
//!
//! ```text
//! cargo run --example user_service            # listens on 127.0.0.1:9001
//! openssl req -x509 -newkey rsa:2048 -nodes -subj /CN=localhost \
//!     -keyout certs/gateway.key -out certs/gateway.crt
//! cargo run -- --config gateway.example.toml
//! curl -k -H "Authorization: Bearer <jwt>" https://127.0.0.1:8443/api/users/42
//! ```

use axum::{
    extract::Path,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const USERS: [&str; 3] = ["Ashik", "Rony", "Maddy"];

async fn list_users() -> Json<Vec<&'static str>> {
    Json(USERS.to_vec())
}

async fn get_user(Path(id): Path<String>, headers: HeaderMap) -> Json<Value> {
    let caller = headers
        .get("x-authenticated-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    Json(json!({ "id": id, "users": USERS, "caller": caller }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let addr = std::env::var("USER_SERVICE_ADDR").unwrap_or_else(|_| "127.0.0.1:9001".to_string());
    let app = Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(address = %listener.local_addr()?, "user_service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
