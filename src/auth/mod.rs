//! Credential validation subsystem.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → credential.rs (header / cookie extraction)
//!     → TokenValidator (jwt.rs locally, or introspection.rs remotely)
//!     → Identity | Rejection
//! ```
//!
//! # Design Decisions
//! - Validators are stateless per request; shared state is limited to key sets
//!   published through `ArcSwap`
//! - Remote validation is always time-bounded; failure is `Unavailable`
//! - Credentials never outlive the request and are redacted in logs

pub mod credential;
pub mod introspection;
pub mod jwt;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::schema::{AuthConfig, AuthMode};
use crate::dispatch::client::HttpClient;
use crate::error::ConfigurationError;

pub use credential::CredentialExtractor;
pub use introspection::IntrospectionValidator;
pub use jwt::{JwtValidator, KeySet};

/// Why a credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    Missing,
    Malformed,
    Expired,
    SignatureInvalid,
    InvalidClaims,
    Unavailable,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Missing => "missing",
            Rejection::Malformed => "malformed",
            Rejection::Expired => "expired",
            Rejection::SignatureInvalid => "signature_invalid",
            Rejection::InvalidClaims => "invalid_claims",
            Rejection::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque credential pulled off a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Claims of a validated credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub scopes: Vec<String>,
    pub issuer: Option<String>,
    pub expires_at: Option<i64>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            scopes: Vec::new(),
            issuer: None,
            expires_at: None,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Validates a credential into an identity.
///
/// Implementations must be safe to call concurrently from every request.
pub trait TokenValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<Identity, Rejection>>;

    /// Pick up rotated keys or endpoints from a reloaded config.
    fn reconfigure(&self, _config: &AuthConfig) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

/// Build the validator selected by `config.mode`.
pub fn build_validator(
    config: &AuthConfig,
    client: HttpClient,
) -> Result<Arc<dyn TokenValidator>, ConfigurationError> {
    match config.mode {
        AuthMode::Jwt => Ok(Arc::new(JwtValidator::from_config(&config.jwt)?)),
        AuthMode::Introspection => Ok(Arc::new(IntrospectionValidator::from_config(
            &config.introspection,
            client,
        )?)),
    }
}
