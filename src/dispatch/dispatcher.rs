//! Request dispatcher.
//!
//! # Responsibilities
//! - Cap concurrent HTTP attempts globally and per host
//! - Report how many attempts are running and how many are waiting
//! - Refuse new attempts once closed
//!
//! # Design Decisions
//! - Limits are tokio semaphores; an attempt holds one global and one host
//!   permit for its whole duration
//! - Host semaphores are created lazily and kept for the dispatcher's lifetime

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;

use crate::config::DispatcherConfig;
use crate::dispatch::guard::{CallCounts, RunningCall};

/// Admission control for outbound HTTP attempts.
#[derive(Debug)]
pub struct Dispatcher {
    max_requests_per_host: usize,
    requests: Arc<Semaphore>,
    hosts: DashMap<String, Arc<Semaphore>>,
    counts: Arc<CallCounts>,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            max_requests_per_host: config.max_requests_per_host,
            requests: Arc::new(Semaphore::new(config.max_requests)),
            hosts: DashMap::new(),
            counts: Arc::new(CallCounts::default()),
        }
    }

    /// Attempts currently holding permits.
    pub fn running_count(&self) -> usize {
        self.counts.running()
    }

    /// Attempts waiting for a permit.
    pub fn queued_count(&self) -> usize {
        self.counts.queued()
    }

    fn host_limit(&self, host: &str) -> Arc<Semaphore> {
        if let Some(sem) = self.hosts.get(host) {
            return sem.clone();
        }
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_requests_per_host)))
            .clone()
    }

    /// Wait for a global and a per-host permit.
    ///
    /// Returns `None` once the dispatcher is closed.
    pub async fn acquire(&self, host: &str) -> Option<RunningCall> {
        let queued = self.counts.enqueue();
        let host_limit = self.host_limit(host);

        let global = self.requests.clone().acquire_owned().await.ok()?;
        let per_host = host_limit.acquire_owned().await.ok()?;

        tracing::trace!(host, running = self.running_count() + 1, "Dispatching request");
        Some(queued.start(vec![global, per_host]))
    }

    /// Stop handing out permits; waiting and future attempts get `None`.
    pub fn close(&self) {
        self.requests.close();
        for host in self.hosts.iter() {
            host.value().close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dispatcher(max_requests: usize, per_host: usize) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(&DispatcherConfig {
            max_requests,
            max_requests_per_host: per_host,
            ..Default::default()
        }))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_counts_running_and_queued() {
        let d = dispatcher(1, 1);

        let first = d.acquire("a:80").await.unwrap();
        assert_eq!(d.running_count(), 1);

        let waiter = tokio::spawn({
            let d = d.clone();
            async move { d.acquire("a:80").await.is_some() }
        });
        settle().await;
        assert_eq!(d.queued_count(), 1);

        drop(first);
        assert!(waiter.await.unwrap());
        assert_eq!(d.running_count(), 0);
        assert_eq!(d.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_per_host_limit() {
        let d = dispatcher(10, 1);

        let _a = d.acquire("a:80").await.unwrap();
        let _b = d.acquire("b:80").await.unwrap();
        assert_eq!(d.running_count(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), d.acquire("a:80")).await;
        assert!(blocked.is_err());
        assert_eq!(d.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let d = dispatcher(1, 1);
        let held = d.acquire("a:80").await.unwrap();

        let waiter = tokio::spawn({
            let d = d.clone();
            async move { d.acquire("a:80").await.is_none() }
        });
        settle().await;

        d.close();
        assert!(d.is_closed());
        assert!(waiter.await.unwrap());
        assert!(d.acquire("b:80").await.is_none());
        drop(held);
        assert_eq!(d.running_count(), 0);
    }
}
