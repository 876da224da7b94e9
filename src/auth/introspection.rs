//! Remote token introspection.
//!
//! POSTs the token to an identity service (RFC 7662 shape) and maps the
//! answer to an identity. Every failure on the way there, including a slow
//! answer, becomes `Rejection::Unavailable`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, Uri},
};
use futures_util::future::{BoxFuture, FutureExt};
use serde::Deserialize;

use crate::auth::{Credential, Identity, Rejection, TokenValidator};
use crate::config::schema::{AuthConfig, IntrospectionConfig};
use crate::dispatch::client::HttpClient;
use crate::error::ConfigurationError;

const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    scope: Option<String>,
    iss: Option<String>,
    exp: Option<i64>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    uri: Uri,
    client_token: Option<HeaderValue>,
    timeout: Duration,
}

impl Endpoint {
    fn from_config(config: &IntrospectionConfig) -> Result<Self, ConfigurationError> {
        let uri: Uri = config.url.parse().map_err(|_| {
            ConfigurationError::invalid("auth.introspection.url", "not a valid URL")
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ConfigurationError::invalid(
                "auth.introspection.url",
                "must be an absolute http(s) URL",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                "auth.introspection.timeout_ms",
                "must be greater than 0",
            ));
        }

        let client_token = config
            .client_token
            .as_ref()
            .map(|token| HeaderValue::from_str(&format!("Bearer {}", token)))
            .transpose()
            .map_err(|_| {
                ConfigurationError::invalid("auth.introspection.client_token", "invalid header value")
            })?;

        Ok(Self {
            uri,
            client_token,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

/// Validator that defers to an external identity service.
pub struct IntrospectionValidator {
    client: HttpClient,
    endpoint: ArcSwap<Endpoint>,
}

impl IntrospectionValidator {
    pub fn from_config(
        config: &IntrospectionConfig,
        client: HttpClient,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client,
            endpoint: ArcSwap::from_pointee(Endpoint::from_config(config)?),
        })
    }

    /// Check an endpoint configuration without building a validator.
    pub fn check_config(config: &IntrospectionConfig) -> Result<(), ConfigurationError> {
        Endpoint::from_config(config).map(|_| ())
    }

    async fn introspect(&self, credential: &Credential) -> Result<Identity, Rejection> {
        let endpoint = self.endpoint.load_full();

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("token", credential.as_str())
            .finish();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(endpoint.uri.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &endpoint.client_token {
            builder = builder.header(header::AUTHORIZATION, token.clone());
        }
        let request = builder.body(Body::from(form)).map_err(|e| {
            tracing::error!(error = %e, "Failed to build introspection request");
            Rejection::Unavailable
        })?;

        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                tracing::warn!(error = %e, "Identity service unreachable");
                Rejection::Unavailable
            })?;

            if !response.status().is_success() {
                tracing::warn!(status = %response.status(), "Identity service returned an error");
                return Err(Rejection::Unavailable);
            }

            let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
                .await
                .map_err(|_| Rejection::Unavailable)?;
            serde_json::from_slice::<IntrospectionResponse>(&bytes).map_err(|e| {
                tracing::warn!(error = %e, "Identity service returned an unreadable body");
                Rejection::Unavailable
            })
        };

        let answer = match tokio::time::timeout(endpoint.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout = ?endpoint.timeout, "Identity service timed out");
                return Err(Rejection::Unavailable);
            }
        };

        into_identity(answer)
    }
}

fn into_identity(answer: IntrospectionResponse) -> Result<Identity, Rejection> {
    if !answer.active {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        return match answer.exp {
            Some(exp) if exp <= now => Err(Rejection::Expired),
            _ => Err(Rejection::SignatureInvalid),
        };
    }

    let subject = answer
        .sub
        .filter(|s| !s.is_empty())
        .ok_or(Rejection::InvalidClaims)?;

    Ok(Identity {
        subject,
        scopes: answer
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        issuer: answer.iss,
        expires_at: answer.exp,
    })
}

impl TokenValidator for IntrospectionValidator {
    fn name(&self) -> &'static str {
        "introspection"
    }

    fn validate<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<Identity, Rejection>> {
        self.introspect(credential).boxed()
    }

    fn reconfigure(&self, config: &AuthConfig) -> Result<(), ConfigurationError> {
        self.endpoint
            .store(std::sync::Arc::new(Endpoint::from_config(&config.introspection)?));
        Ok(())
    }
}
