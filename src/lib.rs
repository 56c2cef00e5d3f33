//! Resilient client for a remote users API.
//!
//! Fetches users from `{base}/users`, projects them into summaries and posts
//! summaries to `{base}/posts`, with bounded retries, a circuit breaker,
//! pooled connections and a bounded worker pool.

// Core subsystems
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod transform;

// Execution
pub mod dispatch;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use client::{ApiClient, BuildError, UserApi};
pub use config::ClientConfig;
pub use dispatch::ApiFuture;
pub use error::{ApiError, ApiResult};
pub use model::{User, UserSummary};
pub use observability::ApiMetrics;
pub use transform::UserTransformer;
