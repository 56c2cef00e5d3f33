//! Resilient client for the users API.
//!
//! # Responsibilities
//! - `GET {base}/users` and decode the user list
//! - `POST {base}/posts` with a JSON summary
//! - Run every attempt through retry and circuit breaker
//! - Offer blocking and future-returning variants of both operations
//! - Count and time each logical call
//!
//! # Design Decisions
//! - One logical call records exactly one success or one error, however
//!   many attempts it took
//! - Non-2xx responses and transport failures keep their own error kinds so
//!   callers can read the status
//! - Clones share the connection pool, breaker, metrics and worker pool

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use crate::client::{BuildError, UserApi};
use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::dispatch::{ApiFuture, Dispatcher, WorkerPool};
use crate::error::{ApiError, ApiResult};
use crate::model::{User, UserSummary};
use crate::observability::metrics::{ApiMetrics, CallTimer, Mode, Operation};
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, Pipeline, RetryPolicy, Timeouts};

pub const USERS_ENDPOINT: &str = "/users";
pub const POSTS_ENDPOINT: &str = "/posts";

/// State shared with in-flight calls.
#[derive(Debug)]
struct ClientCore {
    http: reqwest::Client,
    base_url: String,
    host: String,
    pipeline: Pipeline,
    breaker: Arc<CircuitBreaker>,
    dispatcher: Dispatcher,
    metrics: ApiMetrics,
}

/// Client for the users API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    core: Arc<ClientCore>,
    pool: Arc<WorkerPool>,
    shutdown_grace: Duration,
}

impl ApiClient {
    /// Build a client with its own metrics registry.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        Self::with_metrics(config, ApiMetrics::new())
    }

    /// Build a client recording into `metrics`.
    pub fn with_metrics(config: ClientConfig, metrics: ApiMetrics) -> Result<Self, BuildError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let pool = Arc::new(WorkerPool::new(&config.dispatcher)?);
        Self::with_pool(config, metrics, pool)
    }

    /// Build a client running its calls on `pool`.
    ///
    /// Shutting the client down shuts the pool down too.
    pub fn with_pool(
        config: ClientConfig,
        metrics: ApiMetrics,
        pool: Arc<WorkerPool>,
    ) -> Result<Self, BuildError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let host = Url::parse(&config.base_url)
            .ok()
            .and_then(|url| Some(format!("{}:{}", url.host_str()?, url.port_or_known_default()?)))
            .unwrap_or_else(|| config.base_url.clone());

        let builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool.max_idle_connections)
            .pool_idle_timeout(Duration::from_secs(config.pool.keep_alive_secs))
            .user_agent(concat!("user-api-client/", env!("CARGO_PKG_VERSION")));
        let http = Timeouts::from(&config.timeouts).apply(builder).build()?;

        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let pipeline = Pipeline::standard(RetryPolicy::new(config.retry.clone()), breaker.clone());

        tracing::info!(
            base_url = %config.base_url,
            max_idle_connections = config.pool.max_idle_connections,
            max_requests = config.dispatcher.max_requests,
            max_requests_per_host = config.dispatcher.max_requests_per_host,
            "API client initialized"
        );

        Ok(Self {
            core: Arc::new(ClientCore {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                host,
                pipeline,
                breaker,
                dispatcher: Dispatcher::new(&config.dispatcher),
                metrics,
            }),
            pool,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn metrics(&self) -> &ApiMetrics {
        &self.core.metrics
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.core.breaker
    }

    pub fn circuit_breaker_metrics(&self) -> CircuitBreakerMetrics {
        self.core.breaker.metrics()
    }

    pub fn is_shut_down(&self) -> bool {
        !self.pool.is_accepting()
    }

    pub fn fetch_users(&self) -> ApiResult<Vec<User>> {
        let timer = self.core.metrics.start(Operation::FetchUsers, Mode::Sync);
        self.pool.run(USERS_ENDPOINT, self.core.fetch_users(timer, Mode::Sync))
    }

    pub fn fetch_users_async(&self) -> ApiFuture<Vec<User>> {
        let timer = self.core.metrics.start(Operation::FetchUsers, Mode::Async);
        let core = self.core.clone();
        self.pool.submit(USERS_ENDPOINT, async move { core.fetch_users(timer, Mode::Async).await })
    }

    pub fn post_user_summary(&self, summary: &UserSummary) -> ApiResult<bool> {
        let timer = self.core.metrics.start(Operation::PostUser, Mode::Sync);
        self.pool.run(POSTS_ENDPOINT, self.core.post_user_summary(summary, timer, Mode::Sync))
    }

    pub fn post_user_summary_async(&self, summary: UserSummary) -> ApiFuture<bool> {
        let timer = self.core.metrics.start(Operation::PostUser, Mode::Async);
        let core = self.core.clone();
        self.pool.submit(POSTS_ENDPOINT, async move {
            core.post_user_summary(&summary, timer, Mode::Async).await
        })
    }

    /// HTTP attempts currently in flight.
    pub fn active_connection_count(&self) -> usize {
        self.core.dispatcher.running_count()
    }

    /// HTTP attempts waiting for a dispatcher slot.
    pub fn queued_request_count(&self) -> usize {
        self.core.dispatcher.queued_count()
    }

    /// Stop accepting calls, wait for outstanding ones (up to the configured
    /// grace period), then release threads and connections.
    ///
    /// Safe to call more than once and from any clone; concurrent callers
    /// all return once the drain has finished.
    pub fn shutdown(&self) {
        let drained = self.pool.shutdown(self.shutdown_grace);
        if !self.core.dispatcher.is_closed() {
            self.core.dispatcher.close();
            tracing::info!(drained, "API client shut down");
        }
    }
}

impl ClientCore {
    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn fetch_users(&self, timer: CallTimer, mode: Mode) -> ApiResult<Vec<User>> {
        tracing::info!(%mode, "Fetching users");
        let result = self.pipeline.execute(USERS_ENDPOINT, move || self.fetch_users_once()).await;
        match &result {
            Ok(users) => tracing::info!(%mode, count = users.len(), "Fetched users"),
            Err(e) => tracing::error!(
                %mode,
                status = e.status_code(),
                timeout = e.is_timeout(),
                error = %e,
                "Failed to fetch users"
            ),
        }
        timer.finish(&result);
        result
    }

    async fn fetch_users_once(&self) -> ApiResult<Vec<User>> {
        let io = |source| ApiError::Io { endpoint: USERS_ENDPOINT.to_string(), source };

        let _call = self.dispatcher.acquire(&self.host).await.ok_or_else(|| ApiError::Rejected {
            endpoint: USERS_ENDPOINT.to_string(),
        })?;

        let response = self
            .http
            .get(self.url(USERS_ENDPOINT))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(io)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), endpoint = USERS_ENDPOINT, "Unexpected response code");
            return Err(ApiError::Status { status: status.as_u16(), endpoint: USERS_ENDPOINT.to_string() });
        }

        let body = response.bytes().await.map_err(io)?;
        if body.is_empty() {
            return Err(ApiError::MissingBody { endpoint: USERS_ENDPOINT.to_string() });
        }

        serde_json::from_slice(&body)
            .map_err(|source| ApiError::Decode { endpoint: USERS_ENDPOINT.to_string(), source })
    }

    async fn post_user_summary(&self, summary: &UserSummary, timer: CallTimer, mode: Mode) -> ApiResult<bool> {
        tracing::info!(%mode, user_id = summary.user_id, "Posting user summary");

        let result = match serde_json::to_vec(summary) {
            Ok(body) => {
                let body = body.as_slice();
                self.pipeline.execute(POSTS_ENDPOINT, move || self.post_once(body)).await
            }
            Err(source) => Err(ApiError::Encode { endpoint: POSTS_ENDPOINT.to_string(), source }),
        };

        match &result {
            Ok(_) => tracing::info!(%mode, user_id = summary.user_id, "Posted user summary"),
            Err(e) => tracing::error!(
                %mode,
                user_id = summary.user_id,
                status = e.status_code(),
                timeout = e.is_timeout(),
                error = %e,
                "Failed to post user summary"
            ),
        }
        timer.finish(&result);
        result
    }

    async fn post_once(&self, body: &[u8]) -> ApiResult<bool> {
        let _call = self.dispatcher.acquire(&self.host).await.ok_or_else(|| ApiError::Rejected {
            endpoint: POSTS_ENDPOINT.to_string(),
        })?;

        let response = self
            .http
            .post(self.url(POSTS_ENDPOINT))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|source| ApiError::Io { endpoint: POSTS_ENDPOINT.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), endpoint = POSTS_ENDPOINT, "Unexpected response code");
            return Err(ApiError::Status { status: status.as_u16(), endpoint: POSTS_ENDPOINT.to_string() });
        }
        Ok(true)
    }
}

impl UserApi for ApiClient {
    fn fetch_users(&self) -> ApiResult<Vec<User>> {
        ApiClient::fetch_users(self)
    }

    fn fetch_users_async(&self) -> ApiFuture<Vec<User>> {
        ApiClient::fetch_users_async(self)
    }

    fn post_user_summary(&self, summary: &UserSummary) -> ApiResult<bool> {
        ApiClient::post_user_summary(self, summary)
    }

    fn post_user_summary_async(&self, summary: UserSummary) -> ApiFuture<bool> {
        ApiClient::post_user_summary_async(self, summary)
    }

    fn active_connection_count(&self) -> usize {
        ApiClient::active_connection_count(self)
    }

    fn queued_request_count(&self) -> usize {
        ApiClient::queued_request_count(self)
    }

    fn shutdown(&self) {
        ApiClient::shutdown(self)
    }
}
