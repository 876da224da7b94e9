//! Credential extraction.
//!
//! Looks in the configured header first (`Authorization: Bearer <token>` by
//! default), then in an optional cookie.

use axum::http::{header, HeaderMap, HeaderName};

use crate::auth::{Credential, Rejection};
use crate::config::schema::AuthConfig;
use crate::error::ConfigurationError;

#[derive(Debug, Clone)]
pub struct CredentialExtractor {
    header: HeaderName,
    scheme: String,
    cookie: Option<String>,
}

impl CredentialExtractor {
    pub fn new(header: HeaderName, scheme: impl Into<String>, cookie: Option<String>) -> Self {
        Self {
            header,
            scheme: scheme.into(),
            cookie,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigurationError> {
        let header = HeaderName::from_bytes(config.header.as_bytes())
            .map_err(|_| ConfigurationError::invalid("auth.header", "not a valid header name"))?;
        Ok(Self::new(header, config.scheme.clone(), config.cookie.clone()))
    }

    /// Pull the credential out of `headers`.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Credential, Rejection> {
        if let Some(value) = headers.get(&self.header) {
            let value = value.to_str().map_err(|_| Rejection::Malformed)?.trim();
            return self.strip_scheme(value).map(Credential::new);
        }

        if let Some(name) = &self.cookie {
            if let Some(token) = find_cookie(headers, name) {
                return Ok(Credential::new(token));
            }
        }

        Err(Rejection::Missing)
    }

    fn strip_scheme<'v>(&self, value: &'v str) -> Result<&'v str, Rejection> {
        if self.scheme.is_empty() {
            return non_empty(value);
        }

        let (scheme, token) = value.split_once(' ').ok_or(Rejection::Malformed)?;
        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            return Err(Rejection::Malformed);
        }
        non_empty(token.trim())
    }
}

fn non_empty(token: &str) -> Result<&str, Rejection> {
    if token.is_empty() || token.contains(char::is_whitespace) {
        Err(Rejection::Malformed)
    } else {
        Ok(token)
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
