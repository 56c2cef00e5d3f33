//! Error type shared by every API operation, sync or async.

use thiserror::Error;

/// Status code reported for failures that carry no HTTP status.
pub const INTERNAL_STATUS: u16 = 500;

/// Status code reported for calls that were refused before reaching the network.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Boxed cause for unexpected failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure performing an API operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("Unexpected response code: {status}")]
    Status { status: u16, endpoint: String },

    /// The server answered 2xx without a body.
    #[error("Response body is empty")]
    MissingBody { endpoint: String },

    /// The body could not be decoded.
    #[error("Failed to decode response body: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be encoded.
    #[error("Failed to encode request body: {source}")]
    Encode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Transport failure (connect, read, write, timeout).
    #[error("I/O error calling {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The circuit breaker refused the call.
    #[error("Circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String, endpoint: String },

    /// The client no longer accepts work.
    #[error("Client is shut down")]
    Rejected { endpoint: String },

    /// Anything else that went wrong during the call.
    #[error("{message}")]
    Unexpected {
        message: String,
        endpoint: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn unexpected(message: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into(), endpoint: endpoint.into(), source: None }
    }

    /// HTTP status for this failure; a sentinel when no response was received.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            Self::CircuitOpen { .. } | Self::Rejected { .. } => UNAVAILABLE_STATUS,
            Self::MissingBody { .. }
            | Self::Decode { .. }
            | Self::Encode { .. }
            | Self::Io { .. }
            | Self::Unexpected { .. } => INTERNAL_STATUS,
        }
    }

    /// Endpoint path the failing call targeted.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Status { endpoint, .. }
            | Self::MissingBody { endpoint }
            | Self::Decode { endpoint, .. }
            | Self::Encode { endpoint, .. }
            | Self::Io { endpoint, .. }
            | Self::CircuitOpen { endpoint, .. }
            | Self::Rejected { endpoint }
            | Self::Unexpected { endpoint, .. } => endpoint,
        }
    }

    /// True for transport failures, surfaced unwrapped once retries run out.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// True for transport failures caused by a connect, read or request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.is_timeout())
    }

    /// Default retry predicate.
    ///
    /// Transport failures, non-2xx responses, empty bodies and open-circuit
    /// rejections consume an attempt and are retried. Codec errors, shutdown
    /// rejections and unexpected failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Status { .. } | Self::MissingBody { .. } | Self::CircuitOpen { .. }
        )
    }
}
