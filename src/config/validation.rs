//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile the route table and report every route problem
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Build each stage's policy once so a bad value fails at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GatewayConfig → Result<(), Vec<ConfigurationError>>
//! - Runs before a config is accepted, both at startup and on reload

use std::net::SocketAddr;

use crate::auth::{CredentialExtractor, IntrospectionValidator, KeySet};
use crate::config::schema::{AuthMode, GatewayConfig};
use crate::error::ConfigurationError;
use crate::pipeline::{CorsStage, HeaderPolicyInterceptor};
use crate::routing::RouteTable;
use crate::security::headers::ForwardPolicy;

const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Validate a complete configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ConfigurationError>> {
    let mut errors = Vec::new();

    if let Err(mut route_errors) = RouteTable::build(&config.routes, 0) {
        errors.append(&mut route_errors);
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if let Some(tls) = &config.listener.tls {
        check_address(&mut errors, "listener.tls.bind_address", &tls.bind_address);
        if tls.cert_path.trim().is_empty() {
            errors.push(ConfigurationError::invalid("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ConfigurationError::invalid("listener.tls.key_path", "must not be empty"));
        }
    }
    if config.listener.max_in_flight == 0 {
        errors.push(ConfigurationError::invalid(
            "listener.max_in_flight",
            "must be greater than 0",
        ));
    }

    collect(&mut errors, CredentialExtractor::from_config(&config.auth));
    collect(&mut errors, ForwardPolicy::from_config(&config.auth));
    match config.auth.mode {
        AuthMode::Jwt => collect(&mut errors, KeySet::from_config(&config.auth.jwt)),
        AuthMode::Introspection => collect(
            &mut errors,
            IntrospectionValidator::check_config(&config.auth.introspection),
        ),
    }
    if config.auth.timeout_ms == 0 {
        errors.push(ConfigurationError::invalid("auth.timeout_ms", "must be greater than 0"));
    }

    collect(
        &mut errors,
        HeaderPolicyInterceptor::from_config(&config.interceptor, config.auth.identity_header.as_deref()),
    );
    if config.interceptor.timeout_ms == 0 {
        errors.push(ConfigurationError::invalid(
            "interceptor.timeout_ms",
            "must be greater than 0",
        ));
    }

    if config.cors.enabled {
        collect(&mut errors, CorsStage::from_config(&config.cors));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ConfigurationError::invalid("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ConfigurationError::invalid("timeouts.connect_ms", "must be greater than 0"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ConfigurationError::invalid(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if config.security.max_body_size == 0 {
        errors.push(ConfigurationError::invalid(
            "security.max_body_size",
            "must be greater than 0",
        ));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        let key = config.admin.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            errors.push(ConfigurationError::invalid(
                "admin.api_key",
                "must be set to a real secret when the admin API is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collect<T>(errors: &mut Vec<ConfigurationError>, result: Result<T, ConfigurationError>) {
    if let Err(e) = result {
        errors.push(e);
    }
}

fn check_address(errors: &mut Vec<ConfigurationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ConfigurationError::invalid(
            field,
            format!("`{}` is not a valid socket address", value),
        ));
    }
}
