//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, percentages within bounds)
//! - Check cross-field consistency (per-host limit vs global limit)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
            errors.push(ValidationError::new("base_url", "scheme must be http or https"));
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::new("base_url", "missing host"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("base_url", e.to_string())),
    }

    let d = &config.dispatcher;
    if d.max_requests == 0 {
        errors.push(ValidationError::new("dispatcher.max_requests", "must be greater than 0"));
    }
    if d.max_requests_per_host == 0 {
        errors.push(ValidationError::new("dispatcher.max_requests_per_host", "must be greater than 0"));
    }
    if d.max_requests_per_host > d.max_requests {
        errors.push(ValidationError::new(
            "dispatcher.max_requests_per_host",
            format!("{} exceeds max_requests {}", d.max_requests_per_host, d.max_requests),
        ));
    }
    if d.core_threads == Some(0) {
        errors.push(ValidationError::new("dispatcher.core_threads", "must be greater than 0"));
    }
    if let (Some(core), Some(max)) = (d.core_threads, d.max_threads) {
        if max < core {
            errors.push(ValidationError::new(
                "dispatcher.max_threads",
                format!("{max} is smaller than core_threads {core}"),
            ));
        }
    }
    if d.queue_capacity == 0 {
        errors.push(ValidationError::new("dispatcher.queue_capacity", "must be greater than 0"));
    }

    let t = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_ms", t.connect_ms),
        ("timeouts.read_ms", t.read_ms),
        ("timeouts.write_ms", t.write_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let cb = &config.circuit_breaker;
    if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_rate_threshold",
            "must be within (0, 100]",
        ));
    }
    if cb.sliding_window_size == 0 {
        errors.push(ValidationError::new("circuit_breaker.sliding_window_size", "must be greater than 0"));
    }
    if cb.minimum_number_of_calls == 0 {
        errors.push(ValidationError::new("circuit_breaker.minimum_number_of_calls", "must be greater than 0"));
    }
    if cb.minimum_number_of_calls > cb.sliding_window_size {
        errors.push(ValidationError::new(
            "circuit_breaker.minimum_number_of_calls",
            "cannot exceed sliding_window_size",
        ));
    }
    if cb.permitted_calls_in_half_open == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.permitted_calls_in_half_open",
            "must be greater than 0",
        ));
    }

    let r = &config.retry;
    if r.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if r.multiplier < 1.0 {
        errors.push(ValidationError::new("retry.multiplier", "must be at least 1.0"));
    }
    if r.max_wait_ms < r.wait_ms {
        errors.push(ValidationError::new("retry.max_wait_ms", "cannot be smaller than wait_ms"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
