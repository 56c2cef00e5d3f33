//! Worker pool executing API calls.
//!
//! # Responsibilities
//! - Own the runtime that drives every HTTP exchange
//! - Run blocking calls on the caller's thread with the runtime entered
//! - Spawn async calls, running them on the caller's thread when the
//!   submission queue is full
//! - Drain outstanding work on shutdown, then stop the threads
//!
//! # Design Decisions
//! - The runtime is owned here and never referenced by running tasks, so the
//!   last client handle to go away is the one that stops it
//! - Blocking waits use a plain executor inside the runtime context, which
//!   works from any thread including other runtimes' threads
//! - Shutdown never blocks inside the runtime it is stopping
//! - Calls running on caller threads are abandoned before the runtime stops,
//!   so their timers and sockets are released while the drivers still exist
//! - Concurrent shutdowns serialize; every caller returns after the drain

use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{select, Either};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;

use crate::config::DispatcherConfig;
use crate::dispatch::future::ApiFuture;
use crate::dispatch::guard::WorkTracker;
use crate::error::{ApiError, ApiResult};

/// Threads and submission queue for API calls.
#[derive(Debug)]
pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    queue_capacity: usize,
    accepting: AtomicBool,
    tracker: Arc<WorkTracker>,
    blocking: Arc<WorkTracker>,
    abandon: watch::Sender<bool>,
    stopped: Mutex<Option<bool>>,
}

/// How long a forced shutdown waits for abandoned caller-thread calls to unwind.
const ABANDON_WAIT: Duration = Duration::from_secs(5);

fn abandoned(endpoint: &'static str) -> ApiError {
    ApiError::unexpected("Client shut down before the call completed", endpoint)
}

impl WorkerPool {
    pub fn new(config: &DispatcherConfig) -> io::Result<Self> {
        let core = config.core_threads();
        let max = config.max_threads();
        let runtime = Builder::new_multi_thread()
            .worker_threads(core)
            .max_blocking_threads((max - core).max(1))
            .thread_keep_alive(Duration::from_secs(config.thread_keep_alive_secs))
            .thread_name("api-worker")
            .enable_all()
            .build()?;

        tracing::debug!(
            core_threads = core,
            max_threads = max,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            queue_capacity: config.queue_capacity,
            accepting: AtomicBool::new(true),
            tracker: Arc::new(WorkTracker::default()),
            blocking: Arc::new(WorkTracker::default()),
            abandon: watch::Sender::new(false),
            stopped: Mutex::new(None),
        })
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Async submissions admitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }

    /// Drive `fut` to completion on the current thread.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let _enter = self.handle.enter();
        futures::executor::block_on(fut)
    }

    /// Run a call on the current thread.
    pub fn run<T, F>(&self, endpoint: &'static str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let _tracked = self.tracker.track();
        if !self.is_accepting() {
            return Err(ApiError::Rejected { endpoint: endpoint.to_string() });
        }
        self.run_blocking(endpoint, fut)
    }

    /// Drive a call on the current thread until it completes or the pool
    /// abandons it.
    fn run_blocking<T, F>(&self, endpoint: &'static str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let _blocking = self.blocking.track();
        let mut abandon = self.abandon.subscribe();
        if *abandon.borrow() {
            return Err(abandoned(endpoint));
        }
        self.block_on(async move {
            let call = pin!(fut);
            let abandoned_signal = pin!(abandon.wait_for(|abandoned| *abandoned));
            match select(call, abandoned_signal).await {
                Either::Left((result, _)) => result,
                Either::Right(_) => {
                    tracing::warn!(endpoint, "Abandoning call on caller thread");
                    Err(abandoned(endpoint))
                }
            }
        })
    }

    /// Submit a call to the pool.
    ///
    /// When the queue is full the call runs on the current thread and the
    /// returned future is already complete.
    pub fn submit<T, F>(&self, endpoint: &'static str, fut: F) -> ApiFuture<T>
    where
        F: Future<Output = ApiResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_accepting() {
            return ApiFuture::ready(endpoint, Err(ApiError::Rejected { endpoint: endpoint.to_string() }));
        }

        match self.tracker.try_admit(self.queue_capacity) {
            Some(admission) => {
                let handle = self.handle.spawn(async move {
                    let _admission = admission;
                    fut.await
                });
                ApiFuture::spawned(endpoint, handle)
            }
            None => {
                tracing::warn!(
                    endpoint,
                    queue_capacity = self.queue_capacity,
                    "Submission queue full, running call on caller thread"
                );
                let _tracked = self.tracker.track();
                ApiFuture::ready(endpoint, self.run_blocking(endpoint, fut))
            }
        }
    }

    /// Stop accepting work, wait up to `grace` for outstanding calls, then
    /// stop the threads.
    ///
    /// Concurrent and later calls wait for the first one to finish and return
    /// its outcome: false if work was still running when the grace period
    /// ended.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(drained) = *stopped {
            return drained;
        }

        self.accepting.store(false, Ordering::SeqCst);
        tracing::info!(outstanding = self.tracker.outstanding(), "Shutting down worker pool");

        let drained = self.tracker.wait_idle(grace);
        if !drained {
            tracing::warn!(
                outstanding = self.tracker.outstanding(),
                grace_secs = grace.as_secs(),
                "Grace period elapsed, abandoning outstanding calls"
            );
            self.abandon.send_replace(true);
            if !self.blocking.wait_idle(ABANDON_WAIT) {
                tracing::error!(
                    blocking = self.blocking.outstanding(),
                    "Caller-thread calls still running after abandon"
                );
            }
        }
        self.stop_runtime();
        *stopped = Some(drained);
        drained
    }

    fn stop_runtime(&self) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            tracing::debug!("Worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.accepting.store(false, Ordering::Release);
        self.abandon.send_replace(true);
        self.stop_runtime();
    }
}
