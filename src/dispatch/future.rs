//! Handle to an asynchronous API call.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

use crate::error::{ApiError, ApiResult, BoxError};

enum State<T> {
    Spawned(JoinHandle<ApiResult<T>>),
    Ready(Option<ApiResult<T>>),
}

/// Result of an async API call, resolved exactly once.
///
/// Await it from async code or call [`ApiFuture::wait`] from a plain thread.
/// Failures of the worker task itself surface as [`ApiError::Unexpected`].
pub struct ApiFuture<T> {
    endpoint: &'static str,
    state: State<T>,
}

impl<T> Unpin for ApiFuture<T> {}

impl<T> std::fmt::Debug for ApiFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Spawned(_) => "spawned",
            State::Ready(Some(_)) => "ready",
            State::Ready(None) => "taken",
        };
        f.debug_struct("ApiFuture")
            .field("endpoint", &self.endpoint)
            .field("state", &state)
            .finish()
    }
}

impl<T> ApiFuture<T> {
    pub(crate) fn spawned(endpoint: &'static str, handle: JoinHandle<ApiResult<T>>) -> Self {
        Self { endpoint, state: State::Spawned(handle) }
    }

    /// An already completed call.
    pub fn ready(endpoint: &'static str, result: ApiResult<T>) -> Self {
        Self { endpoint, state: State::Ready(Some(result)) }
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// True once the result is available.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Spawned(handle) => handle.is_finished(),
            State::Ready(_) => true,
        }
    }

    /// Cancel the call if it is still running; awaiting then yields an error.
    pub fn abort(&self) {
        if let State::Spawned(handle) = &self.state {
            handle.abort();
        }
    }

    /// Block the current thread until the call completes.
    pub fn wait(self) -> ApiResult<T> {
        futures::executor::block_on(self)
    }
}

fn join_failure(err: JoinError, endpoint: &'static str) -> ApiError {
    let message = if err.is_cancelled() {
        "API call was cancelled"
    } else {
        "API call panicked"
    };
    ApiError::Unexpected {
        message: message.to_string(),
        endpoint: endpoint.to_string(),
        source: Some(Box::new(err) as BoxError),
    }
}

impl<T> Future for ApiFuture<T> {
    type Output = ApiResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let endpoint = this.endpoint;
        match &mut this.state {
            State::Spawned(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or_else(|e| Err(join_failure(e, endpoint)))),
            State::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(ApiError::unexpected("result already taken", endpoint))),
            ),
        }
    }
}
