//! End-to-end request handling through a live gateway.

mod common;

use std::time::{Duration, Instant};

use api_gateway::config::{RouteConfig, TransportMode};
use common::*;

#[tokio::test]
async fn valid_token_is_forwarded_with_rewritten_path() {
    let backend = start_mock_backend(r#"["Ashik"]"#).await;
    let mut config = base_config();
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/users/42?expand=true"))
        .bearer_auth(token(SECRET, "ashik", "users:read"))
        .header("x-request-id", "trace-42")
        .send()
        .await
        .expect("gateway reachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-request-id"], "trace-42");
    let users: Vec<String> = res.json().await.unwrap();
    assert_eq!(users, vec!["Ashik"]);

    assert_eq!(backend.hits(), 1);
    let head = backend.last_head().unwrap();
    assert!(head.starts_with("get /users/42?expand=true http/1.1"), "{}", head);
    assert!(head.contains("x-authenticated-user: ashik"), "{}", head);
    assert!(head.contains("x-request-id: trace-42"), "{}", head);
    assert!(head.contains("x-forwarded-for: 127.0.0.1"), "{}", head);
}

#[tokio::test]
async fn missing_token_never_reaches_downstream() {
    let backend = start_mock_backend(r#"["Ashik"]"#).await;
    let mut config = base_config();
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/api/users/42")).send().await.unwrap();

    assert_eq!(res.status(), 401);
    assert!(res.headers()["www-authenticate"]
        .to_str()
        .unwrap()
        .starts_with("Bearer"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "auth_error");
    assert!(body["request_id"].is_string());
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn tampered_and_foreign_tokens_are_rejected() {
    let backend = start_mock_backend(r#"["Ashik"]"#).await;
    let mut config = base_config();
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let foreign = token("someone-elses-secret", "ashik", "");
    let mut tampered = token(SECRET, "ashik", "");
    tampered.push('x');

    for credential in [foreign, tampered] {
        let res = client()
            .get(gateway.url("/api/users/42"))
            .bearer_auth(credential)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn missing_scope_is_forbidden() {
    let backend = start_mock_backend("{}").await;
    let mut config = base_config();
    let mut route = users_route(backend.addr);
    route.required_scopes = vec!["users:admin".into()];
    config.routes.push(route);
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/users/42"))
        .bearer_auth(token(SECRET, "rony", "users:read"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn unknown_path_and_wrong_method_are_client_errors() {
    let backend = start_mock_backend("{}").await;
    let mut config = base_config();
    let mut route = users_route(backend.addr);
    route.auth_required = false;
    config.routes.push(route);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/api/orders/1")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client().delete(gateway.url("/api/users/1")).send().await.unwrap();
    assert_eq!(res.status(), 405);
    assert_eq!(res.headers()["allow"], "GET");

    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn slow_downstream_times_out_within_route_deadline() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "late".to_string())
    })
    .await;
    let mut config = base_config();
    let mut route = users_route(backend.addr);
    route.auth_required = false;
    route.timeout_ms = 300;
    config.routes.push(route);
    let gateway = start_gateway(config).await;

    let started = Instant::now();
    let res = client().get(gateway.url("/api/users/7")).send().await.unwrap();

    assert_eq!(res.status(), 504);
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn unreachable_downstream_is_bad_gateway() {
    // Bind then drop to get a port nobody listens on.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = base_config();
    let mut route = users_route(closed);
    route.auth_required = false;
    config.routes.push(route);
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/api/users/7")).send().await.unwrap();

    assert_eq!(res.status(), 502);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream_error");
}

#[tokio::test]
async fn rejections_still_carry_cors_headers() {
    let backend = start_mock_backend("{}").await;
    let mut config = base_config();
    config.cors.allowed_origins = vec!["https://app.example.com".into()];
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/users/42"))
        .header("origin", "https://app.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 401);
    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );

    let preflight = client()
        .request(reqwest::Method::OPTIONS, gateway.url("/api/users/42"))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn only_idempotent_requests_are_retried() {
    let flaky = |hit: usize| async move {
        if hit <= 2 {
            (503, r#"{"error":"warming up"}"#.to_string())
        } else {
            (200, r#"["Ashik","Rony","Maddy"]"#.to_string())
        }
    };

    let get_backend = start_programmable_backend(flaky).await;
    let post_backend = start_programmable_backend(flaky).await;

    let mut config = base_config();
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    for (name, backend) in [("get", &get_backend), ("post", &post_backend)] {
        let mut route = RouteConfig::new(
            name,
            &["GET", "POST"],
            format!("/api/{}", name),
            backend.addr.to_string(),
            "/users",
        );
        route.auth_required = false;
        route.retries = 2;
        route.timeout_ms = 2_000;
        config.routes.push(route);
    }
    let gateway = start_gateway(config).await;

    let res = client().get(gateway.url("/api/get")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(get_backend.hits(), 3);

    let res = client()
        .post(gateway.url("/api/post"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(post_backend.hits(), 1);
}

#[tokio::test]
async fn plain_http_is_redirected_before_authentication() {
    let backend = start_mock_backend("{}").await;
    let mut config = base_config();
    config.transport.mode = TransportMode::Redirect;
    config.transport.https_port = Some(8443);
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/users/42?x=1"))
        .header("host", "gateway.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 307);
    assert_eq!(
        res.headers()["location"],
        "https://gateway.example.com:8443/api/users/42?x=1"
    );
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn spoofed_identity_header_is_replaced() {
    let backend = start_mock_backend("{}").await;
    let mut config = base_config();
    config.routes.push(users_route(backend.addr));
    let gateway = start_gateway(config).await;

    let res = client()
        .get(gateway.url("/api/users/1"))
        .bearer_auth(token(SECRET, "maddy", ""))
        .header("x-authenticated-user", "admin")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let head = backend.last_head().unwrap();
    assert!(head.contains("x-authenticated-user: maddy"), "{}", head);
    assert!(!head.contains("x-authenticated-user: admin"), "{}", head);
}
