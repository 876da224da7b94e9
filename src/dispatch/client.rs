//! Downstream HTTP client.
//!
//! One pooled hyper client is shared by the dispatcher and the introspection
//! validator. It speaks plain HTTP and HTTPS; the route decides which.

use std::time::Duration;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::schema::TimeoutConfig;

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared downstream client.
pub fn build_client(timeouts: &TimeoutConfig) -> HttpClient {
    // Both ring and aws-lc-rs are linked; pin the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));

    let roots = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "No native CA roots available, using bundled webpki roots");
            HttpsConnectorBuilder::new().with_webpki_roots()
        }
    };

    let https = roots
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(timeouts.pool_idle_secs))
        .build(https)
}
