//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a downstream response into a client response
//! - Strip hop-by-hop headers
//! - Stream the body without buffering it
//!
//! # Design Decisions
//! - Status and end-to-end headers pass through verbatim
//! - Headers named in `Connection` are hop-by-hop too

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use hyper::body::Incoming;

/// Headers that describe a single connection rather than the message.
pub fn hop_by_hop_headers() -> [HeaderName; 8] {
    [
        header::CONNECTION,
        HeaderName::from_static("keep-alive"),
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(hop_by_hop_headers().iter()) {
        headers.remove(name);
    }
}

/// Convert a downstream response for the client, streaming its body.
pub fn from_downstream(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
