//! Route table construction and lookup.
//!
//! # Responsibilities
//! - Compile `RouteConfig` entries into immutable routes
//! - Reject invalid and overlapping routes at load time
//! - Look up the single route matching a (method, path) pair
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes bucketed by segment count; a lookup only scans same-length patterns
//! - Ambiguity is a load-time error, never a runtime tie-break
//! - Explicit NotFound / MethodNotAllowed rather than a silent default

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{uri::Authority, Method};

use crate::config::RouteConfig;
use crate::error::ConfigurationError;
use crate::routing::pattern::{split_path, PathParams, PathPattern};

/// HTTP methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    Any,
    Only(Vec<Method>),
}

impl MethodSet {
    fn parse(methods: &[String]) -> Result<Self, String> {
        if methods.is_empty() {
            return Ok(MethodSet::Any);
        }

        let mut parsed: Vec<Method> = Vec::with_capacity(methods.len());
        for raw in methods {
            let method = Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| format!("invalid method `{}`", raw))?;
            if !parsed.contains(&method) {
                parsed.push(method);
            }
        }
        Ok(MethodSet::Only(parsed))
    }

    pub fn contains(&self, method: &Method) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(methods) => methods.contains(method),
        }
    }

    /// A method accepted by both sets, if any.
    fn common(&self, other: &MethodSet) -> Option<String> {
        match (self, other) {
            (MethodSet::Any, MethodSet::Any) => Some("*".to_string()),
            (MethodSet::Any, MethodSet::Only(m)) | (MethodSet::Only(m), MethodSet::Any) => {
                m.first().map(|m| m.to_string())
            }
            (MethodSet::Only(a), MethodSet::Only(b)) => {
                a.iter().find(|m| b.contains(m)).map(|m| m.to_string())
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            MethodSet::Any => vec!["*".to_string()],
            MethodSet::Only(methods) => methods.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A compiled, validated route.
#[derive(Debug)]
pub struct Route {
    name: String,
    methods: MethodSet,
    upstream: PathPattern,
    downstream_scheme: String,
    downstream_host: String,
    downstream_path: PathPattern,
    timeout: Duration,
    auth_required: bool,
    required_scopes: Vec<String>,
    retries: u32,
    forward_credentials: bool,
}

impl Route {
    /// Compile one route, collecting every problem found.
    pub fn compile(config: &RouteConfig) -> Result<Self, Vec<ConfigurationError>> {
        let route_name = if config.name.trim().is_empty() {
            config.upstream.clone()
        } else {
            config.name.clone()
        };
        let mut errors = Vec::new();
        let mut fail = |reason: String| {
            errors.push(ConfigurationError::InvalidRoute {
                route: route_name.clone(),
                reason,
            })
        };

        if config.name.trim().is_empty() {
            fail("name must not be empty".to_string());
        }

        let methods = MethodSet::parse(&config.methods).map_err(&mut fail).ok();
        let upstream = PathPattern::parse(&config.upstream).map_err(&mut fail).ok();
        let downstream_path = PathPattern::parse(&config.downstream_path)
            .map_err(&mut fail)
            .ok();

        if let (Some(upstream), Some(downstream)) = (&upstream, &downstream_path) {
            for param in downstream.params() {
                if !upstream.params().any(|p| p == param) {
                    fail(format!(
                        "downstream parameter `{}` is not bound by upstream pattern `{}`",
                        param, upstream
                    ));
                }
            }
        }

        let scheme = config.downstream_scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            fail(format!(
                "downstream_scheme must be http or https, got `{}`",
                config.downstream_scheme
            ));
        }

        if Authority::from_str(&config.downstream_host).is_err() {
            fail(format!(
                "downstream_host `{}` is not a valid host[:port]",
                config.downstream_host
            ));
        }

        if config.timeout_ms == 0 {
            fail("timeout_ms must be greater than 0".to_string());
        }

        match (methods, upstream, downstream_path) {
            (Some(methods), Some(upstream), Some(downstream_path)) if errors.is_empty() => {
                Ok(Self {
                    name: config.name.clone(),
                    methods,
                    upstream,
                    downstream_scheme: scheme,
                    downstream_host: config.downstream_host.clone(),
                    downstream_path,
                    timeout: Duration::from_millis(config.timeout_ms),
                    auth_required: config.auth_required,
                    required_scopes: config.required_scopes.clone(),
                    retries: config.retries,
                    forward_credentials: config.forward_credentials,
                })
            }
            _ => Err(errors),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    pub fn upstream(&self) -> &PathPattern {
        &self.upstream
    }

    pub fn downstream_scheme(&self) -> &str {
        &self.downstream_scheme
    }

    pub fn downstream_host(&self) -> &str {
        &self.downstream_host
    }

    pub fn downstream_template(&self) -> &PathPattern {
        &self.downstream_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn forward_credentials(&self) -> bool {
        self.forward_credentials
    }
}

/// A route selected for a concrete request, with its bound segments.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    route: Arc<Route>,
    params: PathParams,
}

impl RouteMatch {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Downstream path with bound segments substituted.
    pub fn downstream_path(&self) -> String {
        // Compilation guarantees every downstream parameter is bound upstream.
        self.route
            .downstream_path
            .render(&self.params)
            .unwrap_or_else(|_| self.route.downstream_path.as_str().to_string())
    }
}

/// Result of a table lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Matched(RouteMatch),
    /// The path exists but not for this method.
    MethodNotAllowed(Vec<String>),
    NotFound,
}

/// Immutable routing table.
#[derive(Debug, Default)]
pub struct RouteTable {
    generation: u64,
    routes: Vec<Arc<Route>>,
    by_len: HashMap<usize, Vec<Arc<Route>>>,
}

impl RouteTable {
    /// Compile and validate a full table.
    ///
    /// Disabled routes are skipped. All errors are reported, not just the first.
    pub fn build(configs: &[RouteConfig], generation: u64) -> Result<Self, Vec<ConfigurationError>> {
        let mut errors = Vec::new();
        let mut routes: Vec<Arc<Route>> = Vec::new();

        for config in configs.iter().filter(|c| c.enabled) {
            if routes.iter().any(|r| r.name == config.name) {
                errors.push(ConfigurationError::DuplicateRouteName(config.name.clone()));
                continue;
            }
            match Route::compile(config) {
                Ok(route) => routes.push(Arc::new(route)),
                Err(mut route_errors) => errors.append(&mut route_errors),
            }
        }

        for (i, first) in routes.iter().enumerate() {
            for second in &routes[i + 1..] {
                let Some(method) = first.methods.common(&second.methods) else {
                    continue;
                };
                if let Some(path) = first.upstream.overlap(&second.upstream) {
                    errors.push(ConfigurationError::AmbiguousRoutes {
                        first: first.name.clone(),
                        second: second.name.clone(),
                        method,
                        path,
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut by_len: HashMap<usize, Vec<Arc<Route>>> = HashMap::new();
        for route in &routes {
            by_len.entry(route.upstream.len()).or_default().push(route.clone());
        }

        Ok(Self {
            generation,
            routes,
            by_len,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a request.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let segments = split_path(path);
        let Some(candidates) = self.by_len.get(&segments.len()) else {
            return Lookup::NotFound;
        };

        let mut allowed = Vec::new();
        for route in candidates {
            let Some(params) = route.upstream.match_segments(&segments) else {
                continue;
            };
            if route.methods.contains(method) {
                return Lookup::Matched(RouteMatch {
                    route: route.clone(),
                    params,
                });
            }
            allowed.extend(route.methods.names());
        }

        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            allowed.sort();
            allowed.dedup();
            Lookup::MethodNotAllowed(allowed)
        }
    }

    /// The matching route, or `None` for both not-found and wrong-method.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        match self.lookup(method, path) {
            Lookup::Matched(found) => Some(found),
            _ => None,
        }
    }
}
