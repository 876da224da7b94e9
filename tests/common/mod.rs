//! Shared utilities for gateway integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use api_gateway::config::{GatewayConfig, RouteConfig, TransportMode};
use api_gateway::http::HttpServer;
use api_gateway::lifecycle::Shutdown;
use axum::http::StatusCode;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const SECRET: &str = "integration-secret";

/// A raw-TCP downstream that records what it received.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_head: Arc<Mutex<Option<String>>>,
}

impl MockBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request line and headers of the last request, lowercased.
    pub fn last_head(&self) -> Option<String> {
        self.last_head.lock().unwrap().clone()
    }
}

/// Start a backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Start a backend whose reply is computed from the 1-based hit number.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        last_head: Arc::new(Mutex::new(None)),
    };

    let f = Arc::new(f);
    let state = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let state = state.clone();
            tokio::spawn(async move {
                serve_one(socket, f.as_ref(), &state).await;
            });
        }
    });

    backend
}

async fn serve_one<F, Fut>(mut socket: TcpStream, f: &F, state: &MockBackend)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let Some(head) = read_head(&mut socket).await else {
        return;
    };
    *state.last_head.lock().unwrap() = Some(head.to_ascii_lowercase());
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;

    let (status, body) = f(hit).await;
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            drain_body(socket, &head, buf.len() - (end + 4)).await;
            return Some(head);
        }
    }
}

/// Read the rest of a Content-Length body so closing the socket does not reset it.
async fn drain_body(socket: &mut TcpStream, head: &str, mut received: usize) {
    let expected = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut chunk = [0u8; 1024];
    while received < expected {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received += n,
        }
    }
}

/// A running gateway on a loopback port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> Gateway {
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).expect("valid gateway config");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    Gateway {
        addr,
        shutdown,
        updates,
    }
}

/// Plain-HTTP gateway config with an HMAC key and no routes.
pub fn base_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.transport.mode = TransportMode::Off;
    config.auth.jwt.secret = Some(SECRET.into());
    config.auth.jwt.leeway_secs = 0;
    config
}

/// `/api/users/{id}` → `/users/{id}` on `backend`, GET only, auth required.
pub fn users_route(backend: SocketAddr) -> RouteConfig {
    let mut route = RouteConfig::new(
        "users",
        &["GET"],
        "/api/users/{id}",
        backend.to_string(),
        "/users/{id}",
    );
    route.timeout_ms = 2_000;
    route
}

pub fn token(secret: &str, subject: &str, scope: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    encode(
        &Header::default(),
        &json!({ "sub": subject, "scope": scope, "exp": now + 300 }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
