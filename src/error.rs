//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - Classify every failure a stage can produce
//! - Map each class onto an HTTP status and a JSON error body
//!
//! # Design Decisions
//! - Stages convert their own failures into `GatewayError` before returning
//! - Error bodies never carry downstream or internal details beyond a message

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::Rejection;

/// Status used when the inbound client went away before a reply was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Invalid or ambiguous gateway configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("route `{route}`: {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("routes `{first}` and `{second}` both match {method} {path}")]
    AmbiguousRoutes {
        first: String,
        second: String,
        method: String,
        path: String,
    },

    #[error("duplicate route name `{0}`")]
    DuplicateRouteName(String),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Authentication or authorization failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential rejected: {0}")]
    Rejected(Rejection),

    #[error("missing required scope `{0}`")]
    InsufficientScope(String),
}

/// Failure talking to a downstream service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("downstream did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("downstream connection failed: {0}")]
    Connect(String),

    #[error("invalid downstream request: {0}")]
    InvalidRequest(String),

    #[error("client disconnected before the downstream call completed")]
    Cancelled,
}

/// Every failure that can leave the middleware chain.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{message}")]
    Client { status: StatusCode, message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable class name used in bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::Client { .. } => "client_error",
            GatewayError::Auth(_) => "auth_error",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Client { status, .. } => *status,
            GatewayError::Auth(AuthError::Rejected(_)) => StatusCode::UNAUTHORIZED,
            GatewayError::Auth(AuthError::InsufficientScope(_)) => StatusCode::FORBIDDEN,
            GatewayError::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(UpstreamError::Cancelled) => {
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to hand back to the client.
    fn public_message(&self) -> String {
        match self {
            // Internal details stay in the logs.
            GatewayError::Configuration(_) | GatewayError::Internal(_) => {
                "internal gateway error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl GatewayError {
    /// Render the error, tagging the body with the request it belongs to.
    pub fn into_response_for(self, request_id: &str) -> Response {
        self.render(Some(request_id))
    }

    fn render(self, request_id: Option<&str>) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.kind(),
            "message": self.public_message(),
        });
        if let Some(id) = request_id {
            body["request_id"] = json!(id);
        }

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::Auth(AuthError::Rejected(reason)) = &self {
            let challenge = format!(
                "Bearer error=\"invalid_token\", error_description=\"{}\"",
                reason.as_str()
            );
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.render(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            GatewayError::not_found("no route").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::from(AuthError::Rejected(Rejection::Missing)).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::from(AuthError::InsufficientScope("users:read".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::from(UpstreamError::Timeout { timeout_ms: 10 }).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::from(UpstreamError::Connect("refused".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejection_carries_bearer_challenge() {
        let response = GatewayError::from(AuthError::Rejected(Rejection::Expired)).into_response();
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(challenge.starts_with("Bearer"));
        assert!(challenge.contains("expired"));
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = GatewayError::internal("stage `auth` panicked at src/x.rs:10");
        assert_eq!(err.public_message(), "internal gateway error");
    }
}
