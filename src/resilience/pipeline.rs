//! Ordered composition of resilience policies around one call.
//!
//! # Data Flow
//! ```text
//! Pipeline [Retry, CircuitBreaker]
//!     → Retry: attempt 1..=max
//!         → CircuitBreaker: permit? (no → CircuitOpen, counts as failed attempt)
//!             → raw call (HTTP)
//!         ← outcome recorded in breaker window
//!     ← retry decision
//! ```
//!
//! Layers are listed outermost first. Every attempt made by an outer retry
//! passes through the inner breaker.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::ApiResult;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::retries::{RetryOnResult, RetryPolicy};

/// A single policy in the pipeline.
#[derive(Debug, Clone)]
pub enum Layer {
    Retry(RetryPolicy),
    CircuitBreaker(Arc<CircuitBreaker>),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Retry(_) => "retry",
            Layer::CircuitBreaker(_) => "circuit_breaker",
        }
    }
}

/// Ordered list of policies, outermost first.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    layers: Vec<Layer>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry wrapping the circuit breaker wrapping the call.
    pub fn standard(retry: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self::new().layer(Layer::Retry(retry)).layer(Layer::CircuitBreaker(breaker))
    }

    /// Append a layer inside the existing ones.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Run `call` through every layer.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, call: F) -> ApiResult<T>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = ApiResult<T>> + Send,
        T: RetryOnResult + Send,
    {
        run(&self.layers, endpoint, &call).await
    }
}

fn run<'a, T, F, Fut>(layers: &'a [Layer], endpoint: &'a str, call: &'a F) -> BoxFuture<'a, ApiResult<T>>
where
    F: Fn() -> Fut + Sync,
    Fut: Future<Output = ApiResult<T>> + Send + 'a,
    T: RetryOnResult + Send + 'a,
{
    match layers.split_first() {
        None => call().boxed(),
        Some((Layer::Retry(policy), rest)) => {
            policy.execute(endpoint, move || run(rest, endpoint, call)).boxed()
        }
        Some((Layer::CircuitBreaker(breaker), rest)) => {
            breaker.execute(endpoint, move || run(rest, endpoint, call)).boxed()
        }
    }
}
