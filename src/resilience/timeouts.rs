//! Timeout enforcement.
//!
//! # Responsibilities
//! - Translate configured connect/read/write timeouts onto the HTTP client
//! - Bound the whole attempt with a total deadline
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every outbound call has a deadline
//! - The client has no separate write deadline, so the total request deadline
//!   is connect + read + write
//! - A timed-out attempt is a transport failure and therefore retryable

use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::TimeoutConfig;

/// Resolved timeout durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Timeouts {
    /// Deadline for a whole attempt.
    pub fn total(&self) -> Duration {
        self.connect + self.read + self.write
    }

    /// Apply the timeouts to a client builder.
    pub fn apply(&self, builder: ClientBuilder) -> ClientBuilder {
        builder
            .connect_timeout(self.connect)
            .read_timeout(self.read)
            .timeout(self.total())
    }
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_millis(config.connect_ms),
            read: Duration::from_millis(config.read_ms),
            write: Duration::from_millis(config.write_ms),
        }
    }
}
