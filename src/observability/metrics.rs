//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count calls and errors per operation and per mode (sync/async)
//! - Time successful and failed calls
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `api.fetch.users[.async].count` / `.error.count` (counter)
//! - `api.fetch.users[.async].time` / `.error.time` (timer, seconds)
//! - `api.post.user[.async].count` / `.error.count` (counter)
//! - `api.post.user[.async].time` / `.error.time` (timer, seconds)
//! - `api.dispatcher.running` / `api.dispatcher.queued` (gauge)
//! - `api.circuit_breaker.transitions` (counter, labels: breaker, state)
//!
//! # Design Decisions
//! - Updates never fail and never block the call being measured
//! - Values are kept in-process so they can be read without an exporter
//! - Every update is also forwarded to the `metrics` facade; without an
//!   installed recorder that is a no-op

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Remote operation being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchUsers,
    PostUser,
}

impl Operation {
    fn base_name(&self) -> &'static str {
        match self {
            Operation::FetchUsers => "api.fetch.users",
            Operation::PostUser => "api.post.user",
        }
    }
}

/// Whether the caller blocked or received a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Sync,
    Async,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sync => write!(f, "sync"),
            Mode::Async => write!(f, "async"),
        }
    }
}

/// Name prefix for an operation in a mode, e.g. `api.post.user.async`.
pub fn metric_prefix(operation: Operation, mode: Mode) -> String {
    match mode {
        Mode::Sync => operation.base_name().to_string(),
        Mode::Async => format!("{}.async", operation.base_name()),
    }
}

#[derive(Debug, Default)]
struct TimerStats {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

/// Recorded totals of a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

#[derive(Debug, Default)]
struct Registry {
    counters: DashMap<String, AtomicU64>,
    timers: DashMap<String, TimerStats>,
}

/// Counters and timers for API calls.
///
/// Cloning is cheap and clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    registry: Arc<Registry>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        match self.registry.counters.get(name) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.registry
                    .counters
                    .entry(name.to_string())
                    .or_default()
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        metrics::counter!(name.to_string()).increment(1);
    }

    pub fn record_time(&self, name: &str, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let update = |stats: &TimerStats| {
            stats.count.fetch_add(1, Ordering::Relaxed);
            stats.total_nanos.fetch_add(nanos, Ordering::Relaxed);
            stats.max_nanos.fetch_max(nanos, Ordering::Relaxed);
        };
        match self.registry.timers.get(name) {
            Some(stats) => update(&stats),
            None => update(&self.registry.timers.entry(name.to_string()).or_default()),
        }
        metrics::histogram!(name.to_string()).record(elapsed.as_secs_f64());
    }

    /// Current value of a counter; 0 if never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.registry
            .counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Current totals of a timer; all zero if never recorded.
    pub fn timer(&self, name: &str) -> TimerSnapshot {
        self.registry
            .timers
            .get(name)
            .map(|t| TimerSnapshot {
                count: t.count.load(Ordering::Relaxed),
                total: Duration::from_nanos(t.total_nanos.load(Ordering::Relaxed)),
                max: Duration::from_nanos(t.max_nanos.load(Ordering::Relaxed)),
            })
            .unwrap_or_default()
    }

    /// Start timing one logical call.
    pub fn start(&self, operation: Operation, mode: Mode) -> CallTimer {
        CallTimer {
            metrics: self.clone(),
            prefix: metric_prefix(operation, mode),
            started: Instant::now(),
            finished: false,
        }
    }
}

/// Timing sample for a call in progress.
///
/// Dropping it unfinished counts the call as failed.
#[derive(Debug)]
pub struct CallTimer {
    metrics: ApiMetrics,
    prefix: String,
    started: Instant,
    finished: bool,
}

impl CallTimer {
    pub fn success(mut self) {
        self.record(true);
    }

    pub fn error(mut self) {
        self.record(false);
    }

    /// Record the outcome of `result`.
    pub fn finish<T, E>(self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.success(),
            Err(_) => self.error(),
        }
    }

    fn record(&mut self, ok: bool) {
        self.finished = true;
        let elapsed = self.started.elapsed();
        let suffix = if ok { "" } else { ".error" };
        self.metrics.record_time(&format!("{}{suffix}.time", self.prefix), elapsed);
        self.metrics.increment(&format!("{}{suffix}.count", self.prefix));
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.record(false);
        }
    }
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

/// Publish dispatcher call counts.
pub fn record_dispatcher_counts(running: usize, queued: usize) {
    metrics::gauge!("api.dispatcher.running").set(running as f64);
    metrics::gauge!("api.dispatcher.queued").set(queued as f64);
}

/// Count a circuit breaker state change.
pub fn record_breaker_transition(breaker: &str, state: &str) {
    metrics::counter!(
        "api.circuit_breaker.transitions",
        "breaker" => breaker.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}
