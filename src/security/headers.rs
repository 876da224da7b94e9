//! Header manipulation for downstream requests.
//!
//! # Responsibilities
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Strip hop-by-hop headers
//! - Rewrite `Host` to the downstream authority
//! - Propagate the request ID and the validated identity
//! - Withhold the inbound credential from routes that do not want it
//!
//! # Design Decisions
//! - The client address is appended to any existing X-Forwarded-For chain
//! - The identity header is always rewritten by the gateway, never copied

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Identity;
use crate::config::schema::AuthConfig;
use crate::error::ConfigurationError;
use crate::http::request::{Transport, X_REQUEST_ID};
use crate::http::response::strip_hop_by_hop;
use crate::routing::Route;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Facts about the inbound hop.
#[derive(Debug, Clone, Copy)]
pub struct Forwarded<'a> {
    pub client_addr: Option<SocketAddr>,
    /// Effective client transport, after trusted `X-Forwarded-Proto`.
    pub transport: Transport,
    pub request_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct ForwardPolicy {
    credential_header: HeaderName,
    credential_cookie: Option<String>,
    identity_header: Option<HeaderName>,
}

impl ForwardPolicy {
    pub fn from_config(auth: &AuthConfig) -> Result<Self, ConfigurationError> {
        let credential_header = HeaderName::try_from(auth.header.as_str())
            .map_err(|_| ConfigurationError::invalid("auth.header", "not a valid header name"))?;
        let identity_header = auth
            .identity_header
            .as_deref()
            .map(|name| HeaderName::try_from(name))
            .transpose()
            .map_err(|_| ConfigurationError::invalid("auth.identity_header", "not a valid header name"))?;
        Ok(Self {
            credential_header,
            credential_cookie: auth.cookie.clone(),
            identity_header,
        })
    }

    /// Rewrite inbound headers into the set sent to `route`'s host.
    pub fn apply(
        &self,
        headers: &mut HeaderMap,
        route: &Route,
        identity: Option<&Identity>,
        hop: Forwarded<'_>,
    ) {
        strip_hop_by_hop(headers);

        if let Some(original_host) = headers.remove(header::HOST) {
            headers.insert(X_FORWARDED_HOST, original_host);
        }
        if let Ok(host) = HeaderValue::from_str(route.downstream_host()) {
            headers.insert(header::HOST, host);
        }

        if let Some(addr) = hop.client_addr {
            let ip = addr.ip().to_string();
            let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
                _ => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(hop.transport.scheme()));

        if let Ok(id) = HeaderValue::from_str(hop.request_id) {
            headers.insert(X_REQUEST_ID, id);
        }

        if let Some(name) = &self.identity_header {
            headers.remove(name);
            if let Some(value) = identity.and_then(|i| HeaderValue::from_str(&i.subject).ok()) {
                headers.insert(name.clone(), value);
            }
        }

        if !route.forward_credentials() {
            headers.remove(&self.credential_header);
            if let Some(cookie) = &self.credential_cookie {
                remove_cookie(headers, cookie);
            }
        }
    }
}

/// Drop one cookie by name, keeping the others.
fn remove_cookie(headers: &mut HeaderMap, name: &str) {
    let kept: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k.trim() != name).unwrap_or(true))
        .map(str::to_string)
        .collect();

    headers.remove(header::COOKIE);
    if kept.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&kept.join("; ")) {
        headers.insert(header::COOKIE, value);
    }
}
