//! Route table and key rotation through live config reloads.

mod common;

use std::time::{Duration, Instant};

use api_gateway::config::{GatewayConfig, RouteConfig};
use common::*;

fn open_route(name: &str, upstream: &str, backend: std::net::SocketAddr) -> RouteConfig {
    let mut route = RouteConfig::new(name, &["GET"], upstream, backend.to_string(), "/v");
    route.auth_required = false;
    route.timeout_ms = 2_000;
    route
}

fn pointing_at(backend: std::net::SocketAddr) -> GatewayConfig {
    let mut config = base_config();
    config.routes.push(open_route("version", "/api/version", backend));
    config
}

async fn body_of(gateway: &Gateway, path: &str) -> (u16, String) {
    let res = client().get(gateway.url(path)).send().await.unwrap();
    let status = res.status().as_u16();
    (status, res.text().await.unwrap())
}

/// Poll until `path` answers with `expected`, or give up after two seconds.
async fn wait_for(gateway: &Gateway, path: &str, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let (_, body) = body_of(gateway, path).await;
        if body == expected {
            return;
        }
        assert!(Instant::now() < deadline, "reload never took effect, last body {}", body);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn reload_switches_routes_without_gaps() {
    let blue = start_mock_backend("blue").await;
    let green = start_mock_backend("green").await;
    let gateway = start_gateway(pointing_at(blue.addr)).await;

    assert_eq!(body_of(&gateway, "/api/version").await, (200, "blue".to_string()));

    let addr = gateway.addr;
    let readers: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(async move {
                let client = client();
                let mut seen = Vec::new();
                for _ in 0..25 {
                    let res = client
                        .get(format!("http://{}/api/version", addr))
                        .send()
                        .await
                        .unwrap();
                    seen.push((res.status().as_u16(), res.text().await.unwrap()));
                }
                seen
            })
        })
        .collect();

    for i in 0..10 {
        let target = if i % 2 == 0 { green.addr } else { blue.addr };
        gateway.updates.send(pointing_at(target)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    gateway.updates.send(pointing_at(green.addr)).unwrap();

    for reader in readers {
        for (status, body) in reader.await.unwrap() {
            assert_eq!(status, 200);
            assert!(body == "blue" || body == "green", "unexpected body {}", body);
        }
    }

    wait_for(&gateway, "/api/version", "green").await;
}

#[tokio::test]
async fn invalid_reload_keeps_the_active_table() {
    let blue = start_mock_backend("blue").await;
    let green = start_mock_backend("green").await;
    let gateway = start_gateway(pointing_at(blue.addr)).await;

    let mut ambiguous = pointing_at(green.addr);
    ambiguous
        .routes
        .push(open_route("version-again", "/api/:anything", green.addr));
    gateway.updates.send(ambiguous).unwrap();

    // A valid reload queued behind the bad one proves the bad one was processed.
    let mut marker = pointing_at(blue.addr);
    marker.routes.push(open_route("marker", "/api/marker", green.addr));
    gateway.updates.send(marker).unwrap();
    wait_for(&gateway, "/api/marker", "green").await;

    assert_eq!(body_of(&gateway, "/api/version").await, (200, "blue".to_string()));
}

#[tokio::test]
async fn reload_rotates_jwt_keys() {
    let backend = start_mock_backend(r#"["Ashik"]"#).await;
    let mut config = base_config();
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config.clone()).await;

    let old = token(SECRET, "ashik", "");
    let new = token("rotated-secret", "ashik", "");

    let status = |credential: String| {
        let url = gateway.url("/api/users/1");
        async move {
            client()
                .get(url)
                .bearer_auth(credential)
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }
    };

    assert_eq!(status(old.clone()).await, 200);
    assert_eq!(status(new.clone()).await, 401);

    let mut rotated = config;
    rotated.auth.jwt.secret = Some("rotated-secret".into());
    gateway.updates.send(rotated).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while status(new.clone()).await != 200 {
        assert!(Instant::now() < deadline, "rotated key never accepted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status(old).await, 401);
}
