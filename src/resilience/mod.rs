//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the remote API:
//!     → pipeline.rs (ordered layers, outermost first)
//!     → retries.rs (retryable failure or empty result? wait via backoff.rs, try again)
//!     → circuit_breaker.rs (permit per attempt, outcome recorded in sliding window)
//!     → timeouts.rs (connect/read/write deadlines enforced by the HTTP client)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - The breaker sits inside the retry so each attempt is counted
//! - An open breaker fails fast and still consumes a retry attempt
//! - Policies are plain values; the pipeline makes their order explicit

pub mod backoff;
pub mod circuit_breaker;
pub mod pipeline;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState, Clock, ManualClock, SystemClock};
pub use pipeline::{Layer, Pipeline};
pub use retries::{RetryOnResult, RetryPolicy};
pub use timeouts::Timeouts;
