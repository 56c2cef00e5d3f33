//! Circuit breaker for the remote API.
//!
//! # States
//! - Closed: normal operation, calls pass through and are recorded
//! - Open: API assumed down, calls fail fast without a network attempt
//! - Half-Open: a fixed number of trial calls test for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: window holds >= minimum calls and failure rate >= threshold
//! Open → Half-Open: first call after the open wait elapses
//! Half-Open → Closed: all trial calls done, failure rate < threshold
//! Half-Open → Open: all trial calls done, failure rate >= threshold
//! ```
//!
//! # Design Decisions
//! - Count-based sliding window of the most recent call outcomes
//! - One breaker shared by every operation of a client
//! - Rejected calls are counted but never enter the window
//! - Time comes from a [`Clock`] so transitions can be tested without sleeping

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;

/// Source of monotonic time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Failure rate in percent; `None` until enough calls are recorded.
    pub failure_rate: Option<f32>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub not_permitted_calls: u64,
}

/// Fixed-size ring of call outcomes.
#[derive(Debug)]
struct Window {
    outcomes: VecDeque<bool>,
    failures: usize,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self { outcomes: VecDeque::with_capacity(capacity), failures: 0, capacity }
    }

    fn record(&mut self, failed: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.failures -= 1;
            }
        }
        self.outcomes.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    fn failure_rate(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f32 * 100.0 / self.outcomes.len() as f32
    }

    fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: Window,
    trials: Window,
    trials_admitted: usize,
    opened_at: Option<Instant>,
}

/// Count-based circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    not_permitted: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Inner {
            state: CircuitState::Closed,
            window: Window::new(config.sliding_window_size.max(1)),
            trials: Window::new(config.permitted_calls_in_half_open.max(1)),
            trials_admitted: 0,
            opened_at: None,
        };
        Self { config, inner: Mutex::new(inner), not_permitted: AtomicU64::new(0), clock }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state. An expired open wait is reported as half-open.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.observed_state(&inner)
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        let state = self.observed_state(&inner);
        let window = match state {
            CircuitState::HalfOpen => &inner.trials,
            _ => &inner.window,
        };
        let evaluated = match state {
            CircuitState::HalfOpen => window.len() >= self.config.permitted_calls_in_half_open,
            _ => window.len() >= self.config.minimum_number_of_calls,
        };
        CircuitBreakerMetrics {
            state,
            failure_rate: evaluated.then(|| window.failure_rate()),
            buffered_calls: window.len(),
            failed_calls: window.failures,
            not_permitted_calls: self.not_permitted.load(Ordering::Relaxed),
        }
    }

    fn observed_state(&self, inner: &Inner) -> CircuitState {
        match inner.state {
            CircuitState::Open if self.open_wait_elapsed(inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    /// Return to closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Ask for permission to make a call.
    ///
    /// The returned permit must be completed with [`CallPermit::success`] or
    /// [`CallPermit::failure`]; dropping it unresolved frees its trial slot.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();
        let permitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.open_wait_elapsed(&inner) {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trials_admitted = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trials_admitted < self.config.permitted_calls_in_half_open {
                    inner.trials_admitted += 1;
                    true
                } else {
                    false
                }
            }
        };

        if permitted {
            Some(CallPermit { breaker: self, trial: inner.state == CircuitState::HalfOpen, done: false })
        } else {
            self.not_permitted.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Run `call` if the breaker permits it, recording its outcome.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, call: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let Some(permit) = self.try_acquire() else {
            tracing::debug!(breaker = %self.config.name, endpoint, "Call not permitted");
            return Err(ApiError::CircuitOpen {
                breaker: self.config.name.clone(),
                endpoint: endpoint.to_string(),
            });
        };

        let result = call().await;
        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.failure(),
        }
        result
    }

    fn record(&self, trial: bool, failed: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed if !trial => {
                inner.window.record(failed);
                if inner.window.len() >= self.config.minimum_number_of_calls
                    && inner.window.failure_rate() >= self.config.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.config.name,
                        failure_rate = inner.window.failure_rate(),
                        calls = inner.window.len(),
                        "Failure rate above threshold"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.trials.record(failed);
                if inner.trials.len() >= self.config.permitted_calls_in_half_open {
                    let next = if inner.trials.failure_rate() >= self.config.failure_rate_threshold {
                        CircuitState::Open
                    } else {
                        CircuitState::Closed
                    };
                    self.transition(&mut inner, next);
                }
            }
            // Outcomes from calls admitted under a previous state are dropped.
            _ => {}
        }
    }

    fn release(&self, trial: bool) {
        let mut inner = self.lock();
        if trial && inner.state == CircuitState::HalfOpen {
            inner.trials_admitted = inner.trials_admitted.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.trials.clear();
        inner.trials_admitted = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(self.clock.now()),
            CircuitState::Closed => {
                inner.window.clear();
                inner.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }

        if from != to {
            tracing::info!(breaker = %self.config.name, %from, %to, "Circuit breaker state change");
            metrics::record_breaker_transition(&self.config.name, &to.to_string());
        }
    }

    fn open_wait_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_some_and(|at| self.clock.now().duration_since(at) >= self.config.wait_in_open())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Permission for a single call.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    done: bool,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.done = true;
        self.breaker.record(self.trial, false);
    }

    pub fn failure(mut self) {
        self.done = true;
        self.breaker.record(self.trial, true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.release(self.trial);
        }
    }
}
