//! Retry decisions.
//!
//! # Responsibilities
//! - Determine if an outcome is retryable (idempotent methods only)
//! - Track the per-route attempt budget
//!
//! # Design Decisions
//! - Never retry POST/PATCH or other non-idempotent methods
//! - Connection failures and attempt timeouts are retryable; of the statuses
//!   only 502/503/504 are
//! - Zero configured retries means exactly one attempt

use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Whether an attempt that ended this way may be repeated.
///
/// `is_network_error` covers refused connections and attempts that ran out
/// of their share of the deadline.
pub fn is_retryable(method: &Method, status: Option<StatusCode>, is_network_error: bool) -> bool {
    if !method.is_idempotent() {
        return false;
    }
    if is_network_error {
        return true;
    }
    matches!(
        status,
        Some(StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy for a route configured with `retries` extra attempts.
    pub fn new(retries: u32, backoff: &RetryConfig) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay_ms: backoff.base_delay_ms,
            max_delay_ms: backoff.max_delay_ms,
        }
    }

    /// Narrow the policy to what `method` permits.
    pub fn for_method(mut self, method: &Method) -> Self {
        if !method.is_idempotent() {
            self.max_attempts = 1;
        }
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether more than one attempt can ever happen.
    pub fn allows_retry(&self) -> bool {
        self.max_attempts > 1
    }

    /// Decide after attempt number `attempt` (1-based).
    pub fn should_retry(
        &self,
        attempt: u32,
        method: &Method,
        status: Option<StatusCode>,
        is_network_error: bool,
    ) -> bool {
        attempt < self.max_attempts && is_retryable(method, status, is_network_error)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}
