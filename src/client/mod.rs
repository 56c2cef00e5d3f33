//! API client subsystem.
//!
//! # Data Flow
//! ```text
//! Caller
//!     → api.rs (ApiClient: sync call or async submission)
//!     → dispatch (worker pool, permits)
//!     → resilience (retry → circuit breaker)
//!     → reqwest (pooled connection, timeouts)
//!     → model (decode users / encode summary)
//!     → observability (per-operation counters and timers)
//! ```

pub mod api;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::ApiFuture;
use crate::error::ApiResult;
use crate::model::{User, UserSummary};

pub use api::{ApiClient, POSTS_ENDPOINT, USERS_ENDPOINT};

/// Failure constructing a client.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to start worker pool: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Operations offered to the rest of the application.
pub trait UserApi: Send + Sync {
    /// Fetch every user, blocking the calling thread.
    fn fetch_users(&self) -> ApiResult<Vec<User>>;

    /// Fetch every user in the background.
    fn fetch_users_async(&self) -> ApiFuture<Vec<User>>;

    /// Post one summary, blocking the calling thread.
    fn post_user_summary(&self, summary: &UserSummary) -> ApiResult<bool>;

    /// Post one summary in the background.
    fn post_user_summary_async(&self, summary: UserSummary) -> ApiFuture<bool>;

    /// HTTP attempts currently in flight.
    fn active_connection_count(&self) -> usize;

    /// HTTP attempts waiting for a dispatcher slot.
    fn queued_request_count(&self) -> usize;

    /// Stop accepting work and release threads and connections.
    fn shutdown(&self);
}
