//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the API client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the remote API (endpoints are appended to it).
    pub base_url: String,

    /// Connection pool settings.
    pub pool: PoolConfig,

    /// Dispatcher and worker pool settings.
    pub dispatcher: DispatcherConfig,

    /// Socket timeouts.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry settings.
    pub retry: RetryConfig,

    /// Grace period for outstanding work on shutdown, in seconds.
    pub shutdown_grace_secs: u64,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jsonplaceholder.typicode.com".to_string(),
            pool: PoolConfig::default(),
            dispatcher: DispatcherConfig::default(),
            timeouts: TimeoutConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            shutdown_grace_secs: 30,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at another base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// Variant without connection reuse and with longer timeouts.
    pub fn unpooled() -> Self {
        Self {
            pool: PoolConfig { max_idle_connections: 0, keep_alive_secs: 0 },
            timeouts: TimeoutConfig { connect_ms: 10_000, read_ms: 30_000, write_ms: 30_000 },
            ..Self::default()
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum idle connections kept for reuse.
    pub max_idle_connections: usize,

    /// How long an idle connection is kept alive, in seconds.
    pub keep_alive_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: 100,
            keep_alive_secs: 30,
        }
    }
}

/// Dispatcher and worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum concurrent requests across all hosts.
    pub max_requests: usize,

    /// Maximum concurrent requests to a single host.
    pub max_requests_per_host: usize,

    /// Worker threads (default: 2x available parallelism).
    pub core_threads: Option<usize>,

    /// Upper bound on threads, including blocking helpers (default: 4x).
    pub max_threads: Option<usize>,

    /// Pending async submissions before callers run work themselves.
    pub queue_capacity: usize,

    /// Idle time before surplus threads exit, in seconds.
    pub thread_keep_alive_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_requests_per_host: 100,
            core_threads: None,
            max_threads: None,
            queue_capacity: 10_000,
            thread_keep_alive_secs: 60,
        }
    }
}

impl DispatcherConfig {
    pub fn core_threads(&self) -> usize {
        self.core_threads.unwrap_or_else(|| available_parallelism() * 2).max(1)
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
            .unwrap_or_else(|| available_parallelism() * 4)
            .max(self.core_threads())
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Socket timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Read timeout in milliseconds.
    pub read_ms: u64,

    /// Write timeout in milliseconds.
    pub write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            read_ms: 10_000,
            write_ms: 10_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Name used in logs and errors.
    pub name: String,

    /// Failure rate (percent) at or above which the circuit opens.
    pub failure_rate_threshold: f32,

    /// Number of most recent calls in the sliding window.
    pub sliding_window_size: usize,

    /// Calls recorded before the failure rate is evaluated.
    pub minimum_number_of_calls: usize,

    /// Trial calls admitted while half-open.
    pub permitted_calls_in_half_open: usize,

    /// Time spent open before trial calls are admitted, in milliseconds.
    pub wait_in_open_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "apiService".to_string(),
            failure_rate_threshold: 50.0,
            sliding_window_size: 100,
            minimum_number_of_calls: 20,
            permitted_calls_in_half_open: 10,
            wait_in_open_ms: 1000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn wait_in_open(&self) -> Duration {
        Duration::from_millis(self.wait_in_open_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Wait before the second attempt, in milliseconds.
    pub wait_ms: u64,

    /// Growth factor for subsequent waits (1.0 = fixed wait).
    pub multiplier: f64,

    /// Cap on a single wait, in milliseconds.
    pub max_wait_ms: u64,

    /// Add up to 10% random jitter to each wait.
    pub jitter: bool,

    /// Treat an empty list result as retryable.
    pub retry_on_empty_result: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_ms: 100,
            multiplier: 1.0,
            max_wait_ms: 2000,
            jitter: false,
            retry_on_empty_result: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
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

    /// Log line format.
    pub log_format: LogFormat,

    /// Expose metrics over HTTP.
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
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
