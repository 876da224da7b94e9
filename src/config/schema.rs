//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Route definitions mapping upstream patterns to downstream targets.
    pub routes: Vec<RouteConfig>,

    /// CORS policy applied by the outermost stage.
    pub cors: CorsConfig,

    /// Transport security enforcement.
    pub transport: TransportConfig,

    /// Request interception policy.
    pub interceptor: InterceptorConfig,

    /// Credential extraction and validation.
    pub auth: AuthConfig,

    /// Retry backoff configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional HTTPS listener.
    pub tls: Option<TlsConfig>,

    /// Maximum requests processed concurrently (backpressure).
    pub max_in_flight: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_in_flight: 10_000,
        }
    }
}

/// TLS configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// HTTPS bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A single route from an upstream pattern to a downstream target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Allowed methods. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Upstream path pattern, e.g. `/api/users/{id}` or `/api/users/:id`.
    pub upstream: String,

    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub downstream_scheme: String,

    /// Downstream `host[:port]`.
    pub downstream_host: String,

    /// Downstream path template using the upstream parameter names.
    pub downstream_path: String,

    /// Deadline for the downstream exchange in milliseconds.
    #[serde(default = "default_route_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether a validated credential is required.
    #[serde(default = "default_true")]
    pub auth_required: bool,

    /// Scopes the validated identity must carry.
    #[serde(default)]
    pub required_scopes: Vec<String>,

    /// Extra attempts for idempotent requests (0 = no retry).
    #[serde(default)]
    pub retries: u32,

    /// Forward the inbound credential header to the downstream service.
    #[serde(default = "default_true")]
    pub forward_credentials: bool,

    /// Disabled routes are neither matched nor checked for overlaps.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RouteConfig {
    /// Convenience constructor with defaults for everything optional.
    pub fn new(
        name: impl Into<String>,
        methods: &[&str],
        upstream: impl Into<String>,
        downstream_host: impl Into<String>,
        downstream_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            upstream: upstream.into(),
            downstream_scheme: default_scheme(),
            downstream_host: downstream_host.into(),
            downstream_path: downstream_path.into(),
            timeout_ms: default_route_timeout_ms(),
            auth_required: true,
            required_scopes: Vec::new(),
            retries: 0,
            forward_credentials: true,
            enabled: true,
        }
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_route_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// CORS policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Allowed methods; `*` allows any.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers; `*` allows any.
    pub allowed_headers: Vec<String>,
    /// Response headers exposed to the browser.
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime.
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["*".to_string()],
            allowed_headers: vec!["*".to_string()],
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// What to do with requests that arrive over plain HTTP.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Let plain HTTP through. Only for deployments behind a TLS terminator
    /// that does not set `X-Forwarded-Proto`, or for local development.
    Off,
    #[default]
    Redirect,
    Reject,
}

/// Transport security enforcement.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// Port used in redirect targets; omitted from the URL when unset.
    pub https_port: Option<u16>,
    /// Treat `X-Forwarded-Proto: https` as a secure transport.
    pub trust_forwarded_proto: bool,
    /// Strict-Transport-Security max-age for secure responses.
    pub hsts_max_age_secs: Option<u64>,
}

/// Request interception policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Upper bound on interceptor work per request.
    pub timeout_ms: u64,
    /// Requests with more headers than this are rejected.
    pub max_header_count: usize,
    /// Reject paths containing `..` segments.
    pub reject_path_traversal: bool,
    /// Headers removed before validation and routing.
    pub strip_headers: Vec<String>,
    /// Headers set (overwritten) on every request.
    pub set_headers: BTreeMap<String, String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            max_header_count: 100,
            reject_path_traversal: true,
            strip_headers: Vec::new(),
            set_headers: BTreeMap::new(),
        }
    }
}

/// Which validator checks credentials.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Jwt,
    Introspection,
}

/// Credential extraction and validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Header carrying the credential.
    pub header: String,
    /// Scheme prefix expected in the header value.
    pub scheme: String,
    /// Cookie consulted when the header is absent.
    pub cookie: Option<String>,
    /// Header used to forward the validated subject downstream.
    pub identity_header: Option<String>,
    /// Upper bound on a single validation.
    pub timeout_ms: u64,
    pub jwt: JwtConfig,
    pub introspection: IntrospectionConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Jwt,
            header: "authorization".to_string(),
            scheme: "Bearer".to_string(),
            cookie: None,
            identity_header: Some("x-authenticated-user".to_string()),
            timeout_ms: 2_000,
            jwt: JwtConfig::default(),
            introspection: IntrospectionConfig::default(),
        }
    }
}

/// Local JWT verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwtConfig {
    /// `HS256`, `HS384`, `HS512`, `RS256`, `RS384`, `RS512`, `ES256`, `ES384`.
    pub algorithm: String,
    /// Shared secret for HMAC algorithms.
    pub secret: Option<String>,
    /// PEM public keys for asymmetric algorithms, keyed by `kid`.
    /// Tokens without a `kid` use the only key, or `default` when there are several.
    pub public_keys: BTreeMap<String, String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: None,
            public_keys: BTreeMap::new(),
            issuer: None,
            audience: None,
            leeway_secs: 30,
        }
    }
}

/// Remote token introspection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntrospectionConfig {
    /// Introspection endpoint URL.
    pub url: String,
    /// Optional bearer token presented to the identity service.
    pub client_token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            client_token: None,
            timeout_ms: 1_500,
        }
    }
}

/// Retry backoff configuration. Attempt counts are per route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outer request timeout (safety net above route deadlines) in seconds.
    pub request_secs: u64,

    /// Downstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Idle pooled downstream connection lifetime in seconds.
    pub pool_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            connect_ms: 2_000,
            pool_idle_secs: 90,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
